pub mod logging;
pub mod node;
pub mod python;

pub use logging::DebugAdapterLogger;
pub use node::NodeAdapter;
pub use python::PythonAdapter;
