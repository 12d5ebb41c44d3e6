/// Region boundary crossings derived from the ranging stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegionEvent {
    Entered,
    Exited,
}

impl RegionEvent {
    /// Notification body pushed to subscribers when the boundary is crossed.
    pub fn notification(&self) -> &'static str {
        match self {
            RegionEvent::Entered => "Shark Warning! No Swimming!",
            RegionEvent::Exited => "Looks like it's safe to swim.",
        }
    }
}
