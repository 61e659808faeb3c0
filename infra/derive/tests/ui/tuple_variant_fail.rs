use sealstate_derive::encryption_error;

#[encryption_error]
pub enum DemoError {
    #[error("IO error: {0}")]
    Io(std::io::Error),
}

fn main() {}
