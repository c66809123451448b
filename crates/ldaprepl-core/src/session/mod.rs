//! Session plumbing
//!
//! A session carries messages at one protocol version, fixed when it is
//! opened. Outbound messages go through the [`SessionWriter`] task, inbound
//! frames are decoded in order by the [`SessionReader`], and updates are
//! paced by a [`SendWindow`] / [`ReceiveWindow`] pair.
//!
//! ```text
//!  ┌──────────┐  frames  ┌──────────┐
//!  │  writer  │ ───────► │  reader  │
//!  │  task    │          │          │
//!  └────▲─────┘          └────┬─────┘
//!       │ SendWindow          │ ReceiveWindow
//!       │ ◄──── WindowMsg ────┘
//! ```

pub mod frame;
pub mod reader;
pub mod window;
pub mod writer;

pub use frame::FrameCodec;
pub use reader::SessionReader;
pub use window::{ReceiveWindow, SendWindow};
pub use writer::SessionWriter;
