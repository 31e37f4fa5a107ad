//! Log macros that forward to defmt with `use-defmt` and compile away otherwise

macro_rules! trace {
    ($s:literal $(, $x:expr)* $(,)?) => {
        #[cfg(feature = "use-defmt")]
        ::defmt::trace!($s $(, $x)*);
        #[cfg(not(feature = "use-defmt"))]
        let _ = ($(&$x,)*);
    };
}

macro_rules! debug {
    ($s:literal $(, $x:expr)* $(,)?) => {
        #[cfg(feature = "use-defmt")]
        ::defmt::debug!($s $(, $x)*);
        #[cfg(not(feature = "use-defmt"))]
        let _ = ($(&$x,)*);
    };
}

macro_rules! warn {
    ($s:literal $(, $x:expr)* $(,)?) => {
        #[cfg(feature = "use-defmt")]
        ::defmt::warn!($s $(, $x)*);
        #[cfg(not(feature = "use-defmt"))]
        let _ = ($(&$x,)*);
    };
}
