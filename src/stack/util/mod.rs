mod cache;
mod merge_id;
mod refcount;
mod seqno;

pub use cache::MessageCache;
pub use merge_id::{MergeId, MergeIdGenerator};
pub use refcount::{RefcountImpl, Refcounted};
pub use seqno::{
    Range, Seqno, SeqnoComparator, SeqnoEntry, SeqnoError, SeqnoRange,
    SeqnoResult,
};
