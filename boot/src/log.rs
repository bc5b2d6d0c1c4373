//! Console output.
//!
//! On target, messages go out through defmt.  Host builds print them, which
//! makes test failures easier to follow.  Without either, the messages vanish
//! but their arguments are still evaluated by reference, so nothing becomes
//! unused.

#[cfg(feature = "defmt")]
macro_rules! info {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        defmt::info!($fmt $(, $arg)*)
    };
}

#[cfg(feature = "defmt")]
macro_rules! warn {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        defmt::warn!($fmt $(, $arg)*)
    };
}

#[cfg(all(feature = "std", not(feature = "defmt")))]
macro_rules! info {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        std::println!($fmt $(, $arg)*)
    };
}

#[cfg(all(feature = "std", not(feature = "defmt")))]
macro_rules! warn {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        std::println!(concat!("warning: ", $fmt) $(, $arg)*)
    };
}

#[cfg(not(any(feature = "std", feature = "defmt")))]
macro_rules! info {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{
        $(let _ = &$arg;)*
    }};
}

#[cfg(not(any(feature = "std", feature = "defmt")))]
macro_rules! warn {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{
        $(let _ = &$arg;)*
    }};
}
