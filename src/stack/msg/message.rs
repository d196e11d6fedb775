use std::fmt;

use bytes::Bytes;
use typed_builder::TypedBuilder;

use crate::stack::hex::HexDisplayExt;

/// Number of payload bytes shown when a message is debug-printed.
const PAYLOAD_PREVIEW: usize = 16;

/// Identifies a node in the cluster.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(u64);

impl Address {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_be_bytes().hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// A decoded message as handed over by the transport.
///
/// A message without a `dest` is a multicast. This layer reads the flags but
/// never changes them.
#[derive(Clone, TypedBuilder)]
pub struct Message {
    #[builder(default, setter(strip_option))]
    src: Option<Address>,
    #[builder(default, setter(strip_option))]
    dest: Option<Address>,
    /// Out-of-band: exempt from per-sender ordering.
    #[builder(default)]
    oob: bool,
    /// Must be delivered on its own, never as part of a batch.
    #[builder(default)]
    dont_batch: bool,
    #[builder(default, setter(into))]
    payload: Bytes,
}

impl Message {
    pub fn src(&self) -> Option<Address> {
        self.src
    }

    pub fn dest(&self) -> Option<Address> {
        self.dest
    }

    pub fn is_multicast(&self) -> bool {
        self.dest.is_none()
    }

    pub fn is_oob(&self) -> bool {
        self.oob
    }

    pub fn dont_batch(&self) -> bool {
        self.dont_batch
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dest = match self.dest {
            Some(dest) => dest.to_string(),
            None => "<all>".to_owned(),
        };
        let src = match self.src {
            Some(src) => src.to_string(),
            None => "?".to_owned(),
        };
        write!(f, "[{} -> {}", src, dest)?;
        if self.oob {
            write!(f, " oob")?;
        }
        if self.dont_batch {
            write!(f, " dont_batch")?;
        }
        write!(
            f,
            " {}b {}]",
            self.payload.len(),
            self.payload.hex_preview(PAYLOAD_PREVIEW)
        )
    }
}
