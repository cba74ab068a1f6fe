//! Delivery State Machine
//!
//! Moves a [`DeliveryTrackingRecord`] through a fixed, linear set of
//! states, confirming each step with the remote [`DeliveryApi`] and
//! announcing it on the [`RealtimeChannel`]. When the server cannot be
//! reached the change is kept locally and queued on the offline queue,
//! where [`DeliveryActionHandler`] replays it once back online.

mod api;
mod channel;
mod handler;
mod hold;
mod http;
mod machine;
mod record;
mod status;

pub use api::{
    decode_envelope, ApiEnvelope, ApiErrorBody, DeliveryApi, DeliveryApiError, LocationReport,
    StatusUpdateRequest, INVALID_STATUS_TRANSITION,
};
pub use channel::{
    BroadcastChannel, ChannelError, RealtimeChannel, RealtimeEvent, DEFAULT_CHANNEL_CAPACITY,
};
pub use handler::DeliveryActionHandler;
pub use hold::{ActivityHold, TracingHold};
pub use http::{HttpDeliveryApi, DEFAULT_HTTP_TIMEOUT};
pub use machine::{
    DeliveryConfig, DeliveryStateMachine, LocationReportOutcome, TransitionError,
    TransitionOutcome, DEFAULT_CONFIRM_ATTEMPTS, DEFAULT_CONFIRM_BACKOFF,
};
pub use record::DeliveryTrackingRecord;
pub use status::{DeliveryStatus, UnknownStatus, TRANSITIONS};
