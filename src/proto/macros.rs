/// Defines a 16 bit code enum (record types, classes) with a fallback variant for values
/// that are not known by name. Values should be created through `From<u16>` so that a known
/// code never ends up in the fallback variant.
macro_rules! define_code {
    {
        $(#[$meta:meta])*
        $vis:vis enum $typ:ident / $unknown:ident ($prefix:literal) {
            $($(#[$def_meta:meta])* $name:ident => $num:literal),* $(,)?
        }
    } => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $typ {
            $($(#[$def_meta])* $name,)*
            $unknown(u16),
        }

        impl $typ {
            pub const fn as_u16(&self) -> u16 {
                match self {
                    $(Self::$name => $num,)*
                    Self::$unknown(val) => *val,
                }
            }
        }

        impl From<u16> for $typ {
            fn from(value: u16) -> Self {
                match value {
                    $($num => Self::$name,)*
                    val => Self::$unknown(val),
                }
            }
        }

        impl From<$typ> for u16 {
            fn from(value: $typ) -> Self {
                value.as_u16()
            }
        }

        impl std::fmt::Display for $typ {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$name => f.write_str(stringify!($name)),)*
                    Self::$unknown(val) => write!(f, concat!($prefix, "{}"), val),
                }
            }
        }
    };
}

pub(super) use define_code;
