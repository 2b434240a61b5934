pub mod runtime;
pub mod session;

pub use runtime::{Command, RuntimeOptions, SessionController, SessionHandle};
pub use session::{DeviceFactory, DeviceHandles, MediaDeviceFactory, MicDriver, MicHandle, Session};
