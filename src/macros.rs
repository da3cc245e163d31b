/// Declares a non-exhaustive enum of protocol names.
///
/// Each variant maps to its wire spelling. Generated items: `ALL` (every
/// variant, declaration order), `as_str()`, `Display`, `AsRef<str>` and a
/// case-insensitive `FromStr` failing with [`ParseNameError`] tagged by
/// `kind`.
///
/// [`ParseNameError`]: crate::headers::ParseNameError
///
/// ```ignore
/// define_header_enum! {
///     kind: "event format",
///     pub enum EventFormat {
///         Plain => "plain",
///         Json => "json",
///     }
/// }
/// ```
macro_rules! define_header_enum {
    (
        kind: $kind:literal,
        $(#[$enum_meta:meta])*
        $vis:vis enum $Name:ident {
            $(
                $(#[$var_meta:meta])*
                $variant:ident => $wire:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$enum_meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[non_exhaustive]
        #[allow(missing_docs)]
        $vis enum $Name {
            $(
                $(#[$var_meta])*
                $variant,
            )+
        }

        impl $Name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$Name] = &[$($Name::$variant),+];

            /// Spelling used on the wire.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $($Name::$variant => $wire,)+
                }
            }
        }

        impl ::std::fmt::Display for $Name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl AsRef<str> for $Name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl ::std::str::FromStr for $Name {
            type Err = $crate::headers::ParseNameError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s))
                    .ok_or_else(|| $crate::headers::ParseNameError::new($kind, s))
            }
        }
    };
}
