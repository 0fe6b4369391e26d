use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn io_errors_convert_and_render() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "shiftsql.yml");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.to_string(), "io error: shiftsql.yml");
    }

    #[test]
    fn setup_variants_render_their_message() {
        let cases = [
            (Error::Config("bad".into()), "configuration error: bad"),
            (Error::Database("locked".into()), "database error: locked"),
        ];
        for (err, expected) in cases {
            assert_eq!(err.to_string(), expected);
        }
    }
}
