//! Cross-process control of the supervisor: signal flags on the receiving side,
//! restart and rescan requests on the sending side.

mod notify;
mod signals;

pub use notify::{
    live_supervisor, notify_rescan, registered_supervisor, request_restart, RequestError,
};
pub use signals::{Control, RESCAN_SIGNAL, RESTART_QUEUE_SIGNAL};
