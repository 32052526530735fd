mod bus;
mod handlers;
mod types;

pub use bus::{EventBus, EventReceiver};
pub use handlers::NotificationHandler;
pub use types::{EventSequence, PollingMode, UploadEvent, UploadEventPayload};
