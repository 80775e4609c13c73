//! Request size limits.
//!
//! # Responsibilities
//! - Enforce maximum request body size on streamed bodies
//!
//! # Design Decisions
//! - Declared `Content-Length` over the limit is rejected before any byte
//!   is forwarded; undeclared bodies are cut off once they cross it
//! - The limit never exceeds the absolute submission ceiling

use tower_http::limit::RequestBodyLimitLayer;

use crate::config::schema::{SecurityConfig, ABSOLUTE_MAX_SIZE};

pub fn body_limit(config: &SecurityConfig) -> usize {
    config.max_body_size.clamp(1, ABSOLUTE_MAX_SIZE)
}

pub fn body_limit_layer(config: &SecurityConfig) -> RequestBodyLimitLayer {
    RequestBodyLimitLayer::new(body_limit(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_is_clamped_to_ceiling() {
        let config = SecurityConfig {
            max_body_size: usize::MAX,
        };
        assert_eq!(body_limit(&config), ABSOLUTE_MAX_SIZE);
        assert_eq!(body_limit(&SecurityConfig { max_body_size: 0 }), 1);
    }
}
