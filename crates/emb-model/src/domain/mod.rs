mod kv;
pub use kv::KeyValue;

mod env;
pub use env::Env;

mod flag;
pub use flag::Flag;

mod key;
pub use key::TaskKey;

mod constants;
pub use constants::{CHECKPOINT_PATH_ENV, CHECKPOINT_URL_ENV, DEVICE_ENV, MODEL_TYPE_ENV};
