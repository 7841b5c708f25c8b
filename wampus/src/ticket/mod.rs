mod call;
mod invocation;
mod registration;
mod subscription;

pub use call::{
    CallTicket,
    RpcResult,
};
pub use invocation::{
    ApplicationError,
    InvocationTicket,
    RpcYield,
};
pub use registration::RegistrationTicket;
pub use subscription::{
    Event,
    SubscriptionTicket,
};
