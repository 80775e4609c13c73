//! Network foundation: TLS for the public listener.

pub mod tls;
