pub mod command;
pub mod invoker;
pub mod ipc_transport;
pub mod transport;

pub use command::{
    ClientFrame, Command, CommandName, EmptyPayload, HostFrame, RegisterAllPayload,
    RegisterPayload, ShortcutPayload,
};
pub use invoker::{CommandInvoker, InvokerStats};
pub use ipc_transport::IpcTransport;
pub use transport::{CommandTransport, TransportError};
