//! Output channel for `print_debug`.

/// Receives every value popped by `print_debug`.
pub trait Observer {
    fn emit(&mut self, value: f64);
}

/// Writes each value on its own line to stdout.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdoutObserver;

impl Observer for StdoutObserver {
    fn emit(&mut self, value: f64) {
        println!("{value}");
    }
}

/// Collects values in emission order.
impl Observer for Vec<f64> {
    fn emit(&mut self, value: f64) {
        self.push(value);
    }
}
