use sealstate_derive::encryption_error;

#[encryption_error]
pub struct DemoError {
    message: String,
}

fn main() {}
