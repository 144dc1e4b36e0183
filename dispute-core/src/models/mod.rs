mod category;
mod dispute;
mod enrichment;
mod record;

pub use category::{Category, UnknownCategory};
pub use dispute::{Dispute, DisputeStatus, EnrichedDispute, UnknownStatus};
pub use enrichment::Enrichment;
pub use record::{DisputeRecord, StatusChangeRecord};
