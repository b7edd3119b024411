//! Domain model (ids, rows, outgoing mail, errors).

pub mod errors;
pub mod ids;
pub mod mail;
pub mod message;

pub use self::errors::{DeliveryError, ErrorKind, FatalError, StoreError};
pub use self::ids::MessageId;
pub use self::mail::{MailTemplate, OutgoingMail};
pub use self::message::{MarkPolicy, NewMessage, PendingMessage, sample_messages};
