//! Binary type library format
//!
//! A compiled [`TypeLibrary`] is cached on disk so bindings do not have to be
//! recompiled from IDL on every run. The layout is little-endian throughout:
//!
//! ```text
//! "CHTL" | u16 format version | library | structs | interfaces | coclasses
//! ```
//!
//! Strings are a `u32` byte length followed by UTF-8, UUIDs are 16 bytes in
//! RFC 4122 order and every list is prefixed with a `u32` count.

use crate::error::{Result, TypeLibError};
use crate::library::*;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::path::Path;
use uuid::Uuid;

pub const MAGIC: &[u8; 4] = b"CHTL";
pub const FORMAT_VERSION: u16 = 1;

pub fn encode(lib: &TypeLibrary) -> Bytes {
    let mut buf = BytesMut::with_capacity(1024);
    buf.put_slice(MAGIC);
    buf.put_u16_le(FORMAT_VERSION);

    put_str(&mut buf, &lib.name);
    put_uuid(&mut buf, &lib.uuid);
    buf.put_u16_le(lib.version.0);
    buf.put_u16_le(lib.version.1);

    buf.put_u32_le(lib.structs.len() as u32);
    for def in &lib.structs {
        put_str(&mut buf, &def.name);
        buf.put_u32_le(def.fields.len() as u32);
        for field in &def.fields {
            put_str(&mut buf, &field.name);
            put_type(&mut buf, &field.ty);
        }
    }

    buf.put_u32_le(lib.interfaces.len() as u32);
    for def in &lib.interfaces {
        put_str(&mut buf, &def.name);
        put_uuid(&mut buf, &def.iid);
        put_opt_str(&mut buf, def.base.as_deref());
        buf.put_u32_le(def.methods.len() as u32);
        for method in &def.methods {
            put_str(&mut buf, &method.name);
            buf.put_u16_le(method.opnum);
            buf.put_u32_le(method.params.len() as u32);
            for param in &method.params {
                put_str(&mut buf, &param.name);
                put_type(&mut buf, &param.ty);
                buf.put_u8(match param.direction {
                    ParamDirection::In => 0,
                    ParamDirection::Out => 1,
                    ParamDirection::InOut => 2,
                });
                buf.put_u8(param.retval as u8);
            }
        }
    }

    buf.put_u32_le(lib.coclasses.len() as u32);
    for def in &lib.coclasses {
        put_str(&mut buf, &def.name);
        put_uuid(&mut buf, &def.clsid);
        put_opt_str(&mut buf, def.progid.as_deref());
        put_opt_str(&mut buf, def.threading.as_deref());
        buf.put_u32_le(def.interfaces.len() as u32);
        for member in &def.interfaces {
            put_str(&mut buf, &member.name);
            buf.put_u8(member.is_default as u8);
        }
    }

    buf.freeze()
}

pub fn decode(data: &[u8]) -> Result<TypeLibrary> {
    let mut r = Reader { buf: data };

    if r.take(4)? != MAGIC {
        return Err(TypeLibError::malformed("bad magic"));
    }
    let version = r.u16()?;
    if version == 0 {
        return Err(TypeLibError::malformed("format version 0"));
    }
    if version > FORMAT_VERSION {
        return Err(TypeLibError::VersionIncompatible { found: version, supported: FORMAT_VERSION });
    }

    let name = r.ident()?;
    let uuid = r.uuid()?;
    let major = r.u16()?;
    let minor = r.u16()?;
    let mut lib = TypeLibrary::new(name, uuid, (major, minor));

    for _ in 0..r.count()? {
        let name = r.ident()?;
        let mut fields = Vec::new();
        for _ in 0..r.count()? {
            fields.push(FieldDef { name: r.ident()?, ty: r.type_desc()? });
        }
        lib.structs.push(StructDef { name, fields });
    }

    for _ in 0..r.count()? {
        let name = r.ident()?;
        let iid = r.uuid()?;
        let base = r.opt_ident()?;
        let mut methods = Vec::new();
        for _ in 0..r.count()? {
            let name = r.ident()?;
            let opnum = r.u16()?;
            let mut params = Vec::new();
            for _ in 0..r.count()? {
                let name = r.ident()?;
                let ty = r.type_desc()?;
                let direction = match r.u8()? {
                    0 => ParamDirection::In,
                    1 => ParamDirection::Out,
                    2 => ParamDirection::InOut,
                    other => return Err(TypeLibError::malformed(format!("bad parameter direction {other}"))),
                };
                let retval = r.bool()?;
                params.push(ParamDef { name, ty, direction, retval });
            }
            methods.push(MethodDef { name, opnum, params });
        }
        lib.interfaces.push(InterfaceDef { name, iid, base, methods });
    }

    for _ in 0..r.count()? {
        let name = r.ident()?;
        let clsid = r.uuid()?;
        let progid = r.opt_string()?;
        let threading = r.opt_string()?;
        let mut interfaces = Vec::new();
        for _ in 0..r.count()? {
            interfaces.push(CoclassInterface { name: r.ident()?, is_default: r.bool()? });
        }
        lib.coclasses.push(CoclassDef { name, clsid, progid, threading, interfaces });
    }

    if r.buf.has_remaining() {
        return Err(TypeLibError::malformed(format!("{} trailing bytes", r.buf.remaining())));
    }
    Ok(lib)
}

pub fn read_file(path: impl AsRef<Path>) -> Result<TypeLibrary> {
    let data = std::fs::read(path.as_ref())?;
    decode(&data)
}

pub fn write_file(path: impl AsRef<Path>, lib: &TypeLibrary) -> Result<()> {
    std::fs::write(path.as_ref(), encode(lib))?;
    Ok(())
}

fn put_str(buf: &mut BytesMut, s: &str) {
    buf.put_u32_le(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

fn put_opt_str(buf: &mut BytesMut, s: Option<&str>) {
    match s {
        Some(s) => {
            buf.put_u8(1);
            put_str(buf, s);
        }
        None => buf.put_u8(0),
    }
}

fn put_uuid(buf: &mut BytesMut, uuid: &Uuid) {
    buf.put_slice(uuid.as_bytes());
}

fn put_type(buf: &mut BytesMut, ty: &TypeDesc) {
    let tag = match ty {
        TypeDesc::Void => 0,
        TypeDesc::Bool => 1,
        TypeDesc::I8 => 2,
        TypeDesc::U8 => 3,
        TypeDesc::I16 => 4,
        TypeDesc::U16 => 5,
        TypeDesc::I32 => 6,
        TypeDesc::U32 => 7,
        TypeDesc::I64 => 8,
        TypeDesc::U64 => 9,
        TypeDesc::F32 => 10,
        TypeDesc::F64 => 11,
        TypeDesc::Bstr => 12,
        TypeDesc::WString => 13,
        TypeDesc::HResult => 14,
        TypeDesc::Struct(_) => 15,
        TypeDesc::Interface(_) => 16,
    };
    buf.put_u8(tag);
    if let TypeDesc::Struct(name) | TypeDesc::Interface(name) = ty {
        put_str(buf, name);
    }
}

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn need(&self, n: usize) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(TypeLibError::malformed(format!(
                "truncated: need {n} bytes, have {}",
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        self.need(n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn bool(&mut self) -> Result<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(TypeLibError::malformed(format!("bad boolean {other}"))),
        }
    }

    fn u16(&mut self) -> Result<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16_le())
    }

    fn u32(&mut self) -> Result<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    /// A list count. Every element takes at least one byte, so a count
    /// larger than what is left cannot be honest.
    fn count(&mut self) -> Result<usize> {
        let count = self.u32()? as usize;
        if count > self.buf.remaining() {
            return Err(TypeLibError::malformed(format!("count {count} exceeds remaining data")));
        }
        Ok(count)
    }

    fn string(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| TypeLibError::malformed("string is not UTF-8"))
    }

    fn opt_string(&mut self) -> Result<Option<String>> {
        if self.bool()? {
            Ok(Some(self.string()?))
        } else {
            Ok(None)
        }
    }

    /// A type, member or library name. Generated proxies use these as Rust
    /// identifiers.
    fn ident(&mut self) -> Result<String> {
        let name = self.string()?;
        if !is_identifier(&name) {
            return Err(TypeLibError::malformed(format!("{name:?} is not an identifier")));
        }
        Ok(name)
    }

    fn opt_ident(&mut self) -> Result<Option<String>> {
        if self.bool()? {
            Ok(Some(self.ident()?))
        } else {
            Ok(None)
        }
    }

    fn uuid(&mut self) -> Result<Uuid> {
        let bytes = self.take(16)?;
        Uuid::from_slice(bytes).map_err(|_| TypeLibError::malformed("bad uuid"))
    }

    fn type_desc(&mut self) -> Result<TypeDesc> {
        let ty = match self.u8()? {
            0 => TypeDesc::Void,
            1 => TypeDesc::Bool,
            2 => TypeDesc::I8,
            3 => TypeDesc::U8,
            4 => TypeDesc::I16,
            5 => TypeDesc::U16,
            6 => TypeDesc::I32,
            7 => TypeDesc::U32,
            8 => TypeDesc::I64,
            9 => TypeDesc::U64,
            10 => TypeDesc::F32,
            11 => TypeDesc::F64,
            12 => TypeDesc::Bstr,
            13 => TypeDesc::WString,
            14 => TypeDesc::HResult,
            15 => TypeDesc::Struct(self.ident()?),
            16 => TypeDesc::Interface(self.ident()?),
            other => return Err(TypeLibError::malformed(format!("unknown type tag {other}"))),
        };
        Ok(ty)
    }
}
