macro_rules! mnemonics {
    (
        $vis:vis enum $ident:ident {
            $(
                $mnemonic:ident = $text:literal,
            )*
        }
    ) => {
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
        $vis enum $ident {
            $($mnemonic,)*
        }

        impl $ident {
            /// Case-insensitive lookup of a word.
            fn lookup(word: &str) -> Option<$ident> {
                $(
                    if word.eq_ignore_ascii_case($text) {
                        return Some($ident::$mnemonic);
                    }
                )*
                None
            }
        }

        impl Display for $ident {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                match self {
                    $(
                        $ident::$mnemonic => write!(f, "`{}`", $text),
                    )*
                }
            }
        }
    };
}
