//! HID report sinks.
//!
//! - **`gadget`** – writes reports to a Linux USB gadget HID node
//!   (`/dev/hidg0`).  This is what a deployed device uses.
//! - **`mock`** – `MockHidSink` records reports in memory for tests, and
//!   `DryRunHidSink` only logs them (`--dry-run`).

pub mod gadget;
pub mod mock;

pub use gadget::GadgetHidSink;
pub use mock::{DryRunHidSink, MockHidSink};
