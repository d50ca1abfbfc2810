//! The `utils` module provides the error types and logging setup shared by
//! every other module.

pub mod error;
pub mod logging;

#[cfg(test)]
mod tests {
    use super::logging;

    #[test]
    fn logging_init_accepts_levels() {
        logging::init("info");
        logging::init("debug");
        logging::init("warn");
    }

    #[test]
    fn level_names_ignore_case_and_padding() {
        assert_eq!(logging::parse_level("WARNING"), tracing::Level::WARN);
        assert_eq!(logging::parse_level(" Debug "), tracing::Level::DEBUG);
        assert_eq!(logging::parse_level("trace"), tracing::Level::TRACE);
        assert_eq!(logging::parse_level("error"), tracing::Level::ERROR);
    }

    #[test]
    fn unknown_level_falls_back_to_info() {
        assert_eq!(logging::parse_level("verbose"), tracing::Level::INFO);
        assert_eq!(logging::parse_level(""), tracing::Level::INFO);
    }
}
