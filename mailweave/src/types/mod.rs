//! Data structures shared by the pipeline and the store backends

pub mod address;
pub mod annotation;
pub mod message;
pub mod thread;

pub use annotation::{AnnotationRequest, CalendarLink, NewCalendarLink, ProcessedAnnotation};
pub use message::{Message, NewMessage};
pub use thread::{HistoryEntry, LatestMessage, ThreadHistory, ThreadInfo, ThreadSummary};
