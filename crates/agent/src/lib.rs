//! Chat orchestration for DefiBot.
//!
//! Each user message is answered twice:
//!
//! 1. **Pre-warm** likely tool calls from keywords in the message
//! 2. **Quick reply**: a short acknowledgement from a small model
//! 3. **Detailed reply**: a tool-using loop that sees the pre-warmed data,
//!    with one forced retry when no tool data was gathered and a final
//!    synthesis call when the model returns blank text
//! 4. **UI component**: an optional generated component for the data
//!
//! [`ChatOrchestrator`] ties the steps together for one [`ChatSession`].

pub mod detailed;
pub mod orchestrator;
pub mod prewarm;
pub mod prompts;
pub mod quick;
pub mod session;
pub mod ui;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use detailed::{DetailedReply, DetailedResponder, ToolOutcome};
pub use orchestrator::ChatOrchestrator;
pub use prewarm::{PreWarmed, PreWarmer};
pub use prompts::{APOLOGY, QUICK_FALLBACK};
pub use quick::QuickResponder;
pub use session::{ChatSession, PendingRequest};
pub use ui::{ComponentGenerator, ComponentOrigin, should_generate_ui};
