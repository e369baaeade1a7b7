//! `define_port_error!` and the [`PortError`] classification it implements.
//!
//! Every port error enum gets snake_case constructors, and variants named
//! `Connection` or `Backend` are classified as the backing service being
//! unreachable. Services use that split to choose between
//! `service_unavailable` and `internal_error`.

use crate::domain::Error;

/// Classification shared by every generated port error.
pub trait PortError: std::error::Error {
    /// Whether the backing store or service could not be reached.
    fn is_unavailable(&self) -> bool;
}

/// Map a port failure onto the transport-agnostic domain error.
///
/// `context` names the dependency in the message, for example
/// `"aggregate cache"`.
pub(crate) fn port_failure<E: PortError>(context: &str, error: &E) -> Error {
    if error.is_unavailable() {
        Error::service_unavailable(format!("{context} unavailable: {error}"))
    } else {
        Error::internal(format!("{context} error: {error}"))
    }
}

macro_rules! define_port_error {
    (@unavailable Connection) => { true };
    (@unavailable Backend) => { true };
    (@unavailable $variant:ident) => { false };

    (@ctor $variant:ident) => {
        ::paste::paste! {
            pub fn [<$variant:snake>]() -> Self {
                Self::$variant
            }
        }
    };

    (@ctor $variant:ident { $($field:ident : $ty:ty),* $(,)? }) => {
        ::paste::paste! {
            pub fn [<$variant:snake>]($($field: impl Into<$ty>),*) -> Self {
                Self::$variant { $($field: $field.into()),* }
            }
        }
    };

    (
        $(#[$outer:meta])*
        pub enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident $( { $($field:ident : $ty:ty),* $(,)? } )? => $message:expr
            ),* $(,)?
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
        pub enum $name {
            $(
                $(#[$variant_meta])*
                #[error($message)]
                $variant $( { $($field : $ty),* } )?,
            )*
        }

        impl $name {
            $(
                define_port_error!(@ctor $variant $( { $($field : $ty),* } )?);
            )*
        }

        impl $crate::domain::ports::PortError for $name {
            fn is_unavailable(&self) -> bool {
                match self {
                    $( Self::$variant { .. } => define_port_error!(@unavailable $variant), )*
                }
            }
        }
    };
}

pub(crate) use define_port_error;
