//! Memory address type.

use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use crate::error::FaultlineError;

/// Strongly typed machine address
///
/// Program counters, load site entry points, and probe targets all travel as
/// `Address` so they cannot be mixed up with lengths or counts. The value is
/// stored as `u64` regardless of the target's pointer width.
///
/// ## Example
///
/// ```rust
/// use faultline_core::types::Address;
///
/// let addr = Address::from(0x1000u64);
/// let next_addr = addr + 0x10;
/// assert_eq!(next_addr.value(), 0x1010);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u64);

impl Address
{
    /// The null address (0x0)
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value (usable in const contexts)
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Address as a native `usize`
    ///
    /// Truncates on 32-bit targets; addresses produced on the running
    /// process always fit.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn as_usize(self) -> usize
    {
        self.0 as usize
    }

    /// Reinterpret the address as a raw pointer
    ///
    /// Creating the pointer is safe; dereferencing it is up to the caller
    /// (typically through one of the protected loads).
    pub const fn as_ptr<T>(self) -> *const T
    {
        self.as_usize() as *const T
    }

    /// Add an offset to this address, checking for overflow
    ///
    /// ```rust
    /// use faultline_core::types::Address;
    ///
    /// let addr = Address::from(0x1000u64);
    /// assert_eq!(addr.checked_add(0x100), Some(Address::from(0x1100u64)));
    /// assert_eq!(addr.checked_add(u64::MAX), None);
    /// ```
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }

    /// Distance from `base` to this address, if this address is not below it
    pub fn offset_from(self, base: Address) -> Option<u64>
    {
        self.0.checked_sub(base.0)
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<usize> for Address
{
    fn from(value: usize) -> Self
    {
        Address(value as u64)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:016x}", self.0)
    }
}

impl FromStr for Address
{
    type Err = FaultlineError;

    /// Parse `0x`-prefixed hex or plain decimal
    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        let s = s.trim();
        let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            u64::from_str_radix(hex, 16)
        } else {
            s.parse::<u64>()
        };

        parsed.map(Address).map_err(|e| FaultlineError::InvalidAddress(format!("{s}: {e}")))
    }
}

impl Add<u64> for Address
{
    type Output = Address;

    fn add(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_add(rhs))
    }
}

impl Sub<u64> for Address
{
    type Output = Address;

    fn sub(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_sub(rhs))
    }
}
