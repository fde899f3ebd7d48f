//! Helper for enums that map to SMALLINT lookup tables.
//!
//! Each variant's discriminant matches the seed data order (1-based) in the
//! corresponding lookup table (`job_statuses`, `roles`). The string name is
//! what the API serializes.

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Every variant in seed order.
            pub const ALL: &'static [$name] = &[ $( $name::$variant ),+ ];

            /// Return the database ID.
            pub fn id(self) -> $crate::status::StatusId {
                self as $crate::status::StatusId
            }

            /// Look up a variant by its database ID.
            pub fn from_id(id: $crate::status::StatusId) -> Option<Self> {
                match id {
                    $( $val => Some($name::$variant), )+
                    _ => None,
                }
            }

            /// Canonical name used on the wire and in lookup tables.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $label, )+
                }
            }

            /// Parse a name, ignoring ASCII case.
            pub fn from_name(name: &str) -> Option<Self> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(name))
            }
        }

        impl From<$name> for $crate::status::StatusId {
            fn from(value: $name) -> Self {
                value as $crate::status::StatusId
            }
        }

        impl TryFrom<$crate::status::StatusId> for $name {
            type Error = $crate::error::CoreError;

            fn try_from(id: $crate::status::StatusId) -> Result<Self, Self::Error> {
                Self::from_id(id).ok_or_else(|| {
                    $crate::error::CoreError::Validation(format!(
                        "unknown {} id {id}",
                        stringify!($name)
                    ))
                })
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                Self::from_name(&raw).ok_or_else(|| {
                    serde::de::Error::custom(format!(
                        "unknown {} '{raw}'",
                        stringify!($name)
                    ))
                })
            }
        }
    };
}

pub(crate) use define_status_enum;
