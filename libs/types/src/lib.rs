//! # Loghub Types
//!
//! Shared value types for the log shipping pipeline: the structured
//! [`LogEvent`] produced by applications, the rendered [`LogMessage`] that
//! travels over the wire, and the [`GroupTemplate`] registry that decides how
//! each subscriber group sees an event.
//!
//! ## Quick Start
//!
//! ```rust
//! use loghub_types::{GroupSet, GroupTemplate, Level, LogEvent, LogMessage};
//!
//! let groups = GroupSet::merge_with_default(vec![
//!     GroupTemplate::new("audit", "{Level:u3} {Message}").unwrap(),
//! ])
//! .unwrap();
//!
//! let event = LogEvent::new(Level::Warning, "Disk {Disk} almost full")
//!     .with_property("Disk", "/dev/sda1");
//!
//! for group in groups.iter() {
//!     let text = group.render(&event);
//!     let message = LogMessage::new(event.level().into(), text);
//!     assert_eq!(message.level(), 3);
//! }
//! ```

pub mod error;
pub mod event;
pub mod group;
pub mod level;
pub mod message;
pub mod template;

pub use error::{GroupError, TemplateError};
pub use event::{LogEvent, PropertyValue};
pub use group::{
    normalize_group_name, GroupSet, GroupTemplate, DEFAULT_GROUP_NAME, DEFAULT_OUTPUT_TEMPLATE,
};
pub use level::Level;
pub use message::LogMessage;
pub use template::OutputTemplate;
