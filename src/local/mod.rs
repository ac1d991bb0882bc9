//! Local sessions recorded as workspace descriptors on disk.

pub mod descriptor;
pub mod feed;
pub mod parser;
pub mod question;

pub use descriptor::{ConversationEntry, LocalDescriptor, Role};
pub use feed::LocalFeed;
pub use parser::{parse_descriptor, parse_session, DescriptorParser, LineScanParser, StructuredParser};
pub use question::{QuestionDetector, TrailingQuestion};
