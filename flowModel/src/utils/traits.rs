// Observer for long-running index builds

pub trait BuildProgress {
    /// Called with the number of points inserted so far and the total.
    fn report(&mut self, done: usize, total: usize);
}

impl<F: FnMut(usize, usize)> BuildProgress for F {
    fn report(&mut self, done: usize, total: usize) {
        self(done, total)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl BuildProgress for NoProgress {
    fn report(&mut self, _done: usize, _total: usize) {}
}
