use super::{lowlevel::OpenFlags, Error};

/// Translate an `fopen` style mode string.
///
/// Anything but `"" "r" "r+" "w" "w+" "a" "a+"` is rejected without
/// contacting the server.
pub(super) fn parse_open_mode(mode: &str) -> Result<OpenFlags, Error> {
    use OpenFlags as F;

    Ok(match mode {
        "" | "r" => F::READ,
        "r+" => F::READ | F::WRITE,
        "w" => F::WRITE | F::TRUNCATE | F::CREATE,
        "w+" => F::READ | F::WRITE | F::TRUNCATE | F::CREATE,
        "a" => F::APPEND | F::CREATE | F::WRITE,
        "a+" => F::APPEND | F::CREATE | F::READ | F::WRITE,
        mode => return Err(Error::UnsupportedOpenMode(mode.into())),
    })
}
