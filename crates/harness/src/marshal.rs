//! NDR encoding of call arguments, driven by the bound method's signature

use crate::bindings::{BindingSet, MethodBinding};
use crate::error::{HarnessError, Result};
use crate::handle::{ComObjectHandle, InvokeResult};
use crate::value::{StructValue, Value};
use bytes::Bytes;
use comharness_com::types::{marshal_interface, unmarshal_interface};
use comharness_com::{DcomClient, InterfacePtr, ObjRef};
use comharness_ndr::{Bstr, NdrReader, NdrWriter, WideString};
use comharness_typelib::TypeDesc;
use std::sync::Arc;

/// Nesting limit for struct values
const MAX_DEPTH: usize = 16;

/// Encode `args` as the `[in]` parameters of `method`.
pub(crate) fn encode_inputs(method: &MethodBinding, args: Vec<Value>, set: &BindingSet) -> Result<Bytes> {
    let inputs: Vec<_> = method.inputs().collect();
    if args.len() != inputs.len() {
        return Err(HarnessError::argument_mismatch(
            &method.name,
            format!("expected {} arguments, got {}", inputs.len(), args.len()),
        ));
    }

    let mut writer = NdrWriter::new();
    for (param, arg) in inputs.into_iter().zip(args) {
        write_value(&mut writer, &param.ty, arg, set, 0)
            .map_err(|e| HarnessError::argument_mismatch(&method.name, format!("{}: {e}", param.name)))?;
    }
    Ok(writer.into_bytes())
}

fn write_value(writer: &mut NdrWriter, ty: &TypeDesc, value: Value, set: &BindingSet, depth: usize) -> Result<()> {
    match (ty, value) {
        (TypeDesc::Bool, Value::Bool(v)) => writer.write(&v)?,
        (TypeDesc::I8, Value::I8(v)) => writer.write(&v)?,
        (TypeDesc::U8, Value::U8(v)) => writer.write(&v)?,
        (TypeDesc::I16, Value::I16(v)) => writer.write(&v)?,
        (TypeDesc::U16, Value::U16(v)) => writer.write(&v)?,
        (TypeDesc::I32, Value::I32(v)) => writer.write(&v)?,
        (TypeDesc::U32 | TypeDesc::HResult, Value::U32(v)) => writer.write(&v)?,
        (TypeDesc::I64, Value::I64(v)) => writer.write(&v)?,
        (TypeDesc::U64, Value::U64(v)) => writer.write(&v)?,
        (TypeDesc::F32, Value::F32(v)) => writer.write(&v)?,
        (TypeDesc::F64, Value::F64(v)) => writer.write(&v)?,
        (TypeDesc::Bstr, Value::Str(v)) => writer.write(&Bstr::new(v))?,
        (TypeDesc::Bstr, Value::Empty) => writer.write(&Bstr(None))?,
        (TypeDesc::WString, Value::Str(v)) => writer.write(&WideString::new(v))?,
        (TypeDesc::Struct(name), value) => {
            if depth >= MAX_DEPTH {
                return Err(HarnessError::type_mismatch("shallower struct", name.clone()));
            }
            let def = set
                .struct_def(name)
                .ok_or_else(|| HarnessError::type_mismatch("a defined struct", name.clone()))?;
            let mut value = value.into_struct(name)?;
            for field in &def.fields {
                write_value(writer, &field.ty, value.take(&field.name)?, set, depth + 1)?;
            }
            return Ok(());
        }
        (TypeDesc::Interface(name), value) => {
            let objref = interface_objref(name, value, set)?;
            let ptr = marshal_interface(objref.as_ref())
                .map_err(|e| HarnessError::type_mismatch(format!("{name} pointer"), e.to_string()))?;
            writer.write(&ptr)?
        }
        (ty, value) => return Err(HarnessError::type_mismatch(ty.to_string(), value.type_name())),
    };
    Ok(())
}

/// The OBJREF an `[in]` interface pointer argument travels as
fn interface_objref(interface: &str, value: Value, set: &BindingSet) -> Result<Option<ObjRef>> {
    match value {
        Value::Empty => Ok(None),
        Value::Object(handle) => {
            if !handle.binding().is_a(interface) {
                return Err(HarnessError::type_mismatch(interface, handle.interface_name()));
            }
            // The callee borrows our references rather than receiving its own
            let mut objref = handle.objref().clone();
            objref.std.public_refs = 0;
            Ok(Some(objref))
        }
        Value::Callback(object) => {
            let iid = set.interface(interface)?.iid;
            let objref = object
                .marshal(iid)
                .map_err(|e| HarnessError::type_mismatch(format!("object implementing {interface}"), e.to_string()))?;
            Ok(Some(objref))
        }
        other => Err(HarnessError::type_mismatch(format!("{interface} pointer"), other.type_name())),
    }
}

/// Decode the `[out]` parameters of `method` from a reply.
pub(crate) fn decode_outputs(
    method: &MethodBinding,
    data: &[u8],
    set: &Arc<BindingSet>,
    client: &DcomClient,
) -> Result<InvokeResult> {
    let mut reader = NdrReader::new(data);
    let mut result = InvokeResult::default();
    for param in method.outputs() {
        let value = read_value(&mut reader, &param.ty, set, client, 0)?;
        if param.retval {
            result.retval = Some(value);
        } else {
            result.outs.push((param.name.clone(), value));
        }
    }
    reader.finish()?;
    Ok(result)
}

fn read_value(
    reader: &mut NdrReader<'_>,
    ty: &TypeDesc,
    set: &Arc<BindingSet>,
    client: &DcomClient,
    depth: usize,
) -> Result<Value> {
    let value = match ty {
        TypeDesc::Void => Value::Empty,
        TypeDesc::Bool => Value::Bool(reader.read()?),
        TypeDesc::I8 => Value::I8(reader.read()?),
        TypeDesc::U8 => Value::U8(reader.read()?),
        TypeDesc::I16 => Value::I16(reader.read()?),
        TypeDesc::U16 => Value::U16(reader.read()?),
        TypeDesc::I32 => Value::I32(reader.read()?),
        TypeDesc::U32 | TypeDesc::HResult => Value::U32(reader.read()?),
        TypeDesc::I64 => Value::I64(reader.read()?),
        TypeDesc::U64 => Value::U64(reader.read()?),
        TypeDesc::F32 => Value::F32(reader.read()?),
        TypeDesc::F64 => Value::F64(reader.read()?),
        TypeDesc::Bstr => Value::Str(reader.read::<Bstr>()?.into_string()),
        TypeDesc::WString => Value::Str(reader.read::<WideString>()?.into_string()),
        TypeDesc::Struct(name) => {
            if depth >= MAX_DEPTH {
                return Err(HarnessError::type_mismatch("shallower struct", name.clone()));
            }
            let def = set
                .struct_def(name)
                .ok_or_else(|| HarnessError::type_mismatch("a defined struct", name.clone()))?;
            let mut fields = Vec::with_capacity(def.fields.len());
            for field in &def.fields {
                fields.push((field.name.clone(), read_value(reader, &field.ty, set, client, depth + 1)?));
            }
            Value::Struct(StructValue::new(name.clone(), fields))
        }
        TypeDesc::Interface(name) => {
            let ptr: InterfacePtr = reader.read()?;
            let objref = unmarshal_interface(ptr).map_err(|e| HarnessError::type_mismatch("OBJREF", e.to_string()))?;
            match objref {
                None => Value::Empty,
                Some(objref) => {
                    let binding = match set.interface_by_iid(&objref.iid) {
                        Some(binding) => binding.clone(),
                        None => set.interface(name)?.clone(),
                    };
                    let proxy = client
                        .proxy(objref)
                        .map_err(|e| HarnessError::type_mismatch("reachable OBJREF", e.to_string()))?;
                    Value::Object(ComObjectHandle::new(proxy, binding, set.clone(), client.clone()))
                }
            }
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::BindingSet;

    const IDL: &str = r#"
        typedef struct Point { LONG X; LONG Y; BSTR Label; } Point;

        [object, uuid(2c1f3d5e-7a9b-4c0d-8e1f-203142536475)]
        interface ICanvas : IUnknown {
            HRESULT Plot([in] Point* at, [in] VARIANT_BOOL filled, [out] ULONG* id, [out, retval] Point* snapped);
            HRESULT Clear();
        };
    "#;

    fn set() -> Arc<BindingSet> {
        BindingSet::new("canvas.idl", comharness_typelib::compile(IDL).unwrap())
    }

    fn point(x: i32, y: i32, label: &str) -> Value {
        Value::Struct(StructValue::new(
            "Point",
            vec![
                ("X".to_string(), Value::I32(x)),
                ("Y".to_string(), Value::I32(y)),
                ("Label".to_string(), Value::from(label)),
            ],
        ))
    }

    #[test]
    fn test_encode_inputs() {
        let set = set();
        let plot = set.interface("ICanvas").unwrap().method("Plot").unwrap();
        let stub = encode_inputs(plot, vec![point(3, -4, "a"), Value::Bool(true)], &set).unwrap();

        let mut reader = NdrReader::new(&stub);
        assert_eq!(reader.read::<i32>().unwrap(), 3);
        assert_eq!(reader.read::<i32>().unwrap(), -4);
        assert_eq!(reader.read::<Bstr>().unwrap().as_str(), "a");
        assert!(reader.read::<bool>().unwrap());
        reader.finish().unwrap();
    }

    #[test]
    fn test_argument_count_and_type() {
        let set = set();
        let plot = set.interface("ICanvas").unwrap().method("Plot").unwrap();

        let err = encode_inputs(plot, vec![point(0, 0, "")], &set).unwrap_err();
        assert!(matches!(&err, HarnessError::ArgumentMismatch { reason, .. } if reason.contains("expected 2 arguments")));

        let err = encode_inputs(plot, vec![point(0, 0, ""), Value::I32(1)], &set).unwrap_err();
        assert_eq!(err.to_string(), "bad arguments for Plot: filled: expected VARIANT_BOOL, found i32");

        let err = encode_inputs(plot, vec![Value::from("origin"), Value::Bool(false)], &set).unwrap_err();
        assert!(err.to_string().contains("expected Point, found string"), "{err}");
    }

    #[test]
    fn test_decode_outputs() {
        let set = set();
        let plot = set.interface("ICanvas").unwrap().method("Plot").unwrap();

        let mut writer = NdrWriter::new();
        writer
            .write(&7u32)
            .unwrap()
            .write(&5i32)
            .unwrap()
            .write(&10i32)
            .unwrap()
            .write(&Bstr::new("grid"))
            .unwrap();
        let reply = writer.into_bytes();

        let mut result = decode_outputs(plot, &reply, &set, &DcomClient::default()).unwrap();
        assert_eq!(result.out("id"), Some(&Value::U32(7)));
        assert_eq!(result.take_retval().unwrap(), point(5, 10, "grid"));

        let err = decode_outputs(plot, &reply[..6], &set, &DcomClient::default()).unwrap_err();
        assert!(matches!(err, HarnessError::Ndr(_)));
    }

    #[test]
    fn test_trailing_reply_bytes() {
        let set = set();
        let clear = set.interface("ICanvas").unwrap().method("Clear").unwrap();
        assert!(decode_outputs(clear, &[], &set, &DcomClient::default()).unwrap().is_empty());
        assert!(decode_outputs(clear, &[0, 0, 0, 0], &set, &DcomClient::default()).is_err());
    }
}
