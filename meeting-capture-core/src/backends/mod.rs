pub mod device;
pub mod external_process;
pub mod sdk_callback;
pub mod synthetic;
