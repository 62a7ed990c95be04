// MIT License - Copyright (c) 2026 Peter Wright
// Panel entity status types

pub mod zone;
pub mod partition;
pub mod output;
pub mod system;

pub use zone::ZoneStatusFlags;
pub use partition::PartitionStatusFlags;
pub use output::OutputStatus;
pub use system::SystemStatusFlags;
