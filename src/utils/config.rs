//! Configuration options struct parsing helper.

/// Composes a configuration struct from its default values, then overwrites
/// given fields by parsing from given TOML string if it's not `None`. Keys
/// may be spelled with dashes (volfile style, e.g. `preferred-subvolume`) or
/// underscores. Returns an `Ok(config)` on success, and `Err(HaError)` on
/// parser failure or unknown keys.
///
/// Example:
/// ```no_compile
/// let config = parsed_config!(config_str => HaConfig; preferred_subvolume)?;
/// ```
#[macro_export]
macro_rules! parsed_config {
    ($config_str:expr => $config_type:ty; $($field:ident),+) => {{
        let config_str: Option<&str> = $config_str;

        // closure helper for easier error returning
        let compose_config = || -> Result<$config_type, $crate::HaError> {
            let mut config: $config_type = Default::default();
            let config_str = match config_str {
                Some(s) => s,
                None => return Ok(config),
            };

            let mut table: toml::Table = config_str
                .parse::<toml::Table>()?
                .into_iter()
                .map(|(k, v)| (k.replace('-', "_"), v))
                .collect();

            // traverse through all given field names
            $({
                // if field name found in table (and removed)
                if let Some(v) = table.remove(stringify!($field)) {
                    config.$field = v.try_into()?;
                }
            })+

            // if table is not empty at this time, some parsed keys are not
            // expected hence invalid
            if let Some(key) = table.keys().next() {
                return Err($crate::HaError::msg(format!(
                    "invalid option name '{}' in config",
                    key,
                )));
            }

            Ok(config)
        };

        compose_config()
    }};
}
