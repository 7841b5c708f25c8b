pub mod key;
pub mod router;
