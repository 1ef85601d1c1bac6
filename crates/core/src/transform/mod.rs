use crate::Work;

/// Per-window processing hook.
///
/// The engine hands over its private working buffer; implementations must not
/// keep references into it between calls. There is no error channel, so a
/// transform that cannot do its job should leave the window as it is.
pub trait Transform: Send {
    /// Processes one assembled window in place.
    fn transform(&mut self, window: &mut [Work]);

    /// Builds the output record for fixed-record engines from the processed
    /// window. The default copies the head of the window and zero-pads.
    fn emit(&mut self, window: &[Work], record: &mut [Work]) {
        let n = record.len().min(window.len());
        record[..n].copy_from_slice(&window[..n]);
        record[n..].fill(0.0);
    }
}

impl<F> Transform for F
where
    F: FnMut(&mut [Work]) + Send,
{
    fn transform(&mut self, window: &mut [Work]) {
        self(window)
    }
}

/// Leaves every window untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct Identity;

impl Transform for Identity {
    fn transform(&mut self, _window: &mut [Work]) {}
}
