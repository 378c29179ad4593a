//! Row mappings for the `messages` and `profiles` tables.

mod message_record;
mod profile_record;

pub use message_record::MessageRecord;
pub use profile_record::ProfileRecord;
