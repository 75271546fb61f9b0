//! HRESULT status codes

use std::fmt;

/// A COM status code. The high bit set means failure.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HResult(pub u32);

impl HResult {
    pub const fn new(code: u32) -> Self {
        Self(code)
    }

    pub const fn code(self) -> u32 {
        self.0
    }

    pub const fn is_success(self) -> bool {
        self.0 & 0x8000_0000 == 0
    }

    pub const fn is_failure(self) -> bool {
        !self.is_success()
    }

    /// Symbolic name for the codes this crate knows
    pub fn name(self) -> Option<&'static str> {
        KNOWN.iter().find(|(hr, _)| *hr == self).map(|(_, name)| *name)
    }

    /// `Ok(())` for success codes, `Err(self)` otherwise
    pub fn ok(self) -> Result<(), HResult> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<u32> for HResult {
    fn from(code: u32) -> Self {
        Self(code)
    }
}

impl From<HResult> for u32 {
    fn from(hr: HResult) -> Self {
        hr.0
    }
}

impl fmt::Display for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "0x{:08X} ({})", self.0, name),
            None => write!(f, "0x{:08X}", self.0),
        }
    }
}

impl fmt::Debug for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HResult({self})")
    }
}

pub const S_OK: HResult = HResult(0x0000_0000);
pub const S_FALSE: HResult = HResult(0x0000_0001);
pub const E_NOTIMPL: HResult = HResult(0x8000_4001);
pub const E_NOINTERFACE: HResult = HResult(0x8000_4002);
pub const E_POINTER: HResult = HResult(0x8000_4003);
pub const E_FAIL: HResult = HResult(0x8000_4005);
pub const E_UNEXPECTED: HResult = HResult(0x8000_FFFF);
pub const E_INVALIDARG: HResult = HResult(0x8007_0057);
pub const CLASS_E_NOAGGREGATION: HResult = HResult(0x8004_0110);
pub const CLASS_E_CLASSNOTAVAILABLE: HResult = HResult(0x8004_0111);
pub const REGDB_E_CLASSNOTREG: HResult = HResult(0x8004_0154);
pub const CO_E_SERVER_EXEC_FAILURE: HResult = HResult(0x8008_0005);
pub const RPC_E_SERVER_DIED_DNE: HResult = HResult(0x8001_0012);
pub const RPC_E_DISCONNECTED: HResult = HResult(0x8001_0108);
pub const RPC_E_WRONG_THREAD: HResult = HResult(0x8001_010E);
pub const RPC_E_INVALID_IPID: HResult = HResult(0x8001_0113);
pub const RPC_E_TIMEOUT: HResult = HResult(0x8001_011F);
pub const DISP_E_UNKNOWNNAME: HResult = HResult(0x8002_0006);

const KNOWN: &[(HResult, &str)] = &[
    (S_OK, "S_OK"),
    (S_FALSE, "S_FALSE"),
    (E_NOTIMPL, "E_NOTIMPL"),
    (E_NOINTERFACE, "E_NOINTERFACE"),
    (E_POINTER, "E_POINTER"),
    (E_FAIL, "E_FAIL"),
    (E_UNEXPECTED, "E_UNEXPECTED"),
    (E_INVALIDARG, "E_INVALIDARG"),
    (CLASS_E_NOAGGREGATION, "CLASS_E_NOAGGREGATION"),
    (CLASS_E_CLASSNOTAVAILABLE, "CLASS_E_CLASSNOTAVAILABLE"),
    (REGDB_E_CLASSNOTREG, "REGDB_E_CLASSNOTREG"),
    (CO_E_SERVER_EXEC_FAILURE, "CO_E_SERVER_EXEC_FAILURE"),
    (RPC_E_SERVER_DIED_DNE, "RPC_E_SERVER_DIED_DNE"),
    (RPC_E_DISCONNECTED, "RPC_E_DISCONNECTED"),
    (RPC_E_WRONG_THREAD, "RPC_E_WRONG_THREAD"),
    (RPC_E_INVALID_IPID, "RPC_E_INVALID_IPID"),
    (RPC_E_TIMEOUT, "RPC_E_TIMEOUT"),
    (DISP_E_UNKNOWNNAME, "DISP_E_UNKNOWNNAME"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_and_failure() {
        assert!(S_OK.is_success());
        assert!(S_FALSE.is_success());
        assert!(E_POINTER.is_failure());
        assert_eq!(E_FAIL.ok(), Err(E_FAIL));
        assert_eq!(S_FALSE.ok(), Ok(()));
    }

    #[test]
    fn test_display() {
        assert_eq!(REGDB_E_CLASSNOTREG.to_string(), "0x80040154 (REGDB_E_CLASSNOTREG)");
        assert_eq!(HResult(0x8000_1234).to_string(), "0x80001234");
    }
}
