use core::fmt;

/// Renders a byte slice as uppercase hex, optionally cut off after `limit`
/// bytes with a trailing `..`.
pub struct HexSlice<'a> {
    bytes: &'a [u8],
    limit: Option<usize>,
}

impl<'a> HexSlice<'a> {
    fn new<T>(data: &'a T, limit: Option<usize>) -> HexSlice<'a>
    where
        T: ?Sized + AsRef<[u8]> + 'a,
    {
        HexSlice {
            bytes: data.as_ref(),
            limit,
        }
    }
}

impl fmt::Display for HexSlice<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = match self.limit {
            Some(limit) => &self.bytes[..self.bytes.len().min(limit)],
            None => self.bytes,
        };
        for byte in shown {
            write!(f, "{:02X}", byte)?;
        }
        if shown.len() < self.bytes.len() {
            write!(f, "..")?;
        }
        Ok(())
    }
}

impl fmt::Debug for HexSlice<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

pub trait HexDisplayExt {
    fn hex(&self) -> HexSlice<'_>;

    /// Like [`HexDisplayExt::hex`], but shows at most `limit` bytes.
    fn hex_preview(&self, limit: usize) -> HexSlice<'_>;
}

impl<T> HexDisplayExt for T
where
    T: ?Sized + AsRef<[u8]>,
{
    fn hex(&self) -> HexSlice<'_> {
        HexSlice::new(self, None)
    }

    fn hex_preview(&self, limit: usize) -> HexSlice<'_> {
        HexSlice::new(self, Some(limit))
    }
}
