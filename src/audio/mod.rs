//! Audio capture: device enumeration, capture queue, recording session.

pub mod devices;
pub mod queue;
pub mod session;
pub mod state;
pub mod wav_dump;

pub use devices::{list_input_devices, DeviceQueryError, InputDevice};
pub use session::{CaptureError, CaptureSession};
