//! Logging macros
//!
//! Inside the server these forward to the ereport macros so messages obey
//! `client_min_messages`/`log_min_messages`. Outside it (unit tests, pure
//! library use) they go to `tracing`.

#[macro_export]
macro_rules! dist_debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "pg")]
        {
            ::pgrx::debug1!($($arg)*);
        }
        #[cfg(not(feature = "pg"))]
        {
            ::tracing::debug!($($arg)*);
        }
    }};
}

#[macro_export]
macro_rules! dist_info {
    ($($arg:tt)*) => {{
        #[cfg(feature = "pg")]
        {
            ::pgrx::info!($($arg)*);
        }
        #[cfg(not(feature = "pg"))]
        {
            ::tracing::info!($($arg)*);
        }
    }};
}

#[macro_export]
macro_rules! dist_warning {
    ($($arg:tt)*) => {{
        #[cfg(feature = "pg")]
        {
            ::pgrx::warning!($($arg)*);
        }
        #[cfg(not(feature = "pg"))]
        {
            ::tracing::warn!($($arg)*);
        }
    }};
}
