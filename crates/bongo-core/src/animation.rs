use crate::types::{AnimationState, Edge, InputSource, Paw, PawEvent};
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: AnimationState,
    pub to: AnimationState,
    pub at: Instant,
}

/// Paw state machine.
///
/// The state is derived from the set of held inputs: a paw is down while at
/// least one input assigned to it is held. When nothing has happened for
/// `idle_timeout` the held set is dropped and the cat returns to idle; this
/// also recovers from releases the hook never delivered.
#[derive(Debug, Clone)]
pub struct Animator {
    state: AnimationState,
    held: HashMap<InputSource, Paw>,
    idle_timeout: Duration,
    last_transition: Instant,
    last_activity: Instant,
}

impl Animator {
    pub fn new(idle_timeout: Duration, now: Instant) -> Self {
        Self {
            state: AnimationState::Idle,
            held: HashMap::new(),
            idle_timeout,
            last_transition: now,
            last_activity: now,
        }
    }

    pub fn state(&self) -> AnimationState {
        self.state
    }

    pub fn last_transition(&self) -> Instant {
        self.last_transition
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn set_idle_timeout(&mut self, timeout: Duration) {
        self.idle_timeout = timeout;
    }

    pub fn paw_down(&self, paw: Paw) -> bool {
        self.held.values().any(|p| *p == paw)
    }

    /// Record input activity that did not change paws (e.g. auto-repeat).
    pub fn touch(&mut self, now: Instant) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    pub fn on_event(&mut self, ev: &PawEvent) -> Option<Transition> {
        self.touch(ev.t);
        match ev.edge {
            Edge::Down => {
                self.held.insert(ev.source, ev.paw);
            }
            Edge::Up => {
                self.held.remove(&ev.source);
            }
        }
        let next = AnimationState::from_paws(self.paw_down(Paw::Left), self.paw_down(Paw::Right));
        self.transition_to(next, ev.t)
    }

    /// Advance the inactivity timer.
    pub fn tick(&mut self, now: Instant) -> Option<Transition> {
        if self.state == AnimationState::Idle && self.held.is_empty() {
            return None;
        }
        if now.saturating_duration_since(self.last_activity) < self.idle_timeout {
            return None;
        }
        self.held.clear();
        self.transition_to(AnimationState::Idle, now)
    }

    /// Drop held inputs matching `pred` and re-derive the state.
    pub fn release_where(
        &mut self,
        pred: impl Fn(&InputSource) -> bool,
        now: Instant,
    ) -> Option<Transition> {
        self.held.retain(|source, _| !pred(source));
        let next = AnimationState::from_paws(self.paw_down(Paw::Left), self.paw_down(Paw::Right));
        self.transition_to(next, now)
    }

    /// Drop all held inputs and return to idle immediately.
    pub fn reset(&mut self, now: Instant) -> Option<Transition> {
        self.held.clear();
        self.transition_to(AnimationState::Idle, now)
    }

    fn transition_to(&mut self, next: AnimationState, at: Instant) -> Option<Transition> {
        if next == self.state {
            return None;
        }
        let t = Transition {
            from: self.state,
            to: next,
            at,
        };
        tracing::trace!("animation {:?} -> {:?}", t.from, t.to);
        self.state = next;
        self.last_transition = at;
        Some(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(sc: u16) -> InputSource {
        InputSource::key(0, sc, false)
    }

    fn ev(source: InputSource, paw: Paw, edge: Edge, t: Instant) -> PawEvent {
        PawEvent {
            paw,
            edge,
            source,
            t,
        }
    }

    #[test]
    fn test_single_paw_press_release() {
        let t0 = Instant::now();
        let mut anim = Animator::new(DEFAULT_IDLE_TIMEOUT, t0);
        let a = key(0x1E);

        let tr = anim.on_event(&ev(a, Paw::Left, Edge::Down, t0)).unwrap();
        assert_eq!(tr.from, AnimationState::Idle);
        assert_eq!(tr.to, AnimationState::LeftDown);

        let t1 = t0 + Duration::from_millis(80);
        let tr = anim.on_event(&ev(a, Paw::Left, Edge::Up, t1)).unwrap();
        assert_eq!(tr.to, AnimationState::Idle);
        assert_eq!(anim.last_transition(), t1);
    }

    #[test]
    fn test_both_down_and_partial_release() {
        let t0 = Instant::now();
        let mut anim = Animator::new(DEFAULT_IDLE_TIMEOUT, t0);
        let a = key(0x1E);
        let l = key(0x26);

        anim.on_event(&ev(a, Paw::Left, Edge::Down, t0));
        let tr = anim.on_event(&ev(l, Paw::Right, Edge::Down, t0)).unwrap();
        assert_eq!(tr.to, AnimationState::BothDown);

        // Releasing one paw keeps the other down.
        let tr = anim.on_event(&ev(a, Paw::Left, Edge::Up, t0)).unwrap();
        assert_eq!(tr.to, AnimationState::RightDown);

        let tr = anim.on_event(&ev(l, Paw::Right, Edge::Up, t0)).unwrap();
        assert_eq!(tr.to, AnimationState::Idle);
    }

    #[test]
    fn test_same_paw_two_keys() {
        let t0 = Instant::now();
        let mut anim = Animator::new(DEFAULT_IDLE_TIMEOUT, t0);
        let a = key(0x1E);
        let s = key(0x1F);

        anim.on_event(&ev(a, Paw::Left, Edge::Down, t0));
        assert!(anim.on_event(&ev(s, Paw::Left, Edge::Down, t0)).is_none());
        // One of two left keys released: still down.
        assert!(anim.on_event(&ev(a, Paw::Left, Edge::Up, t0)).is_none());
        assert_eq!(anim.state(), AnimationState::LeftDown);
        let tr = anim.on_event(&ev(s, Paw::Left, Edge::Up, t0)).unwrap();
        assert_eq!(tr.to, AnimationState::Idle);
    }

    #[test]
    fn test_inactivity_timeout_returns_to_idle() {
        let t0 = Instant::now();
        let mut anim = Animator::new(Duration::from_millis(500), t0);
        let a = key(0x1E);

        anim.on_event(&ev(a, Paw::Left, Edge::Down, t0));
        assert!(anim.tick(t0 + Duration::from_millis(499)).is_none());
        let tr = anim.tick(t0 + Duration::from_millis(500)).unwrap();
        assert_eq!(tr.to, AnimationState::Idle);

        // The lost release is forgotten: a later release changes nothing.
        assert!(anim
            .on_event(&ev(a, Paw::Left, Edge::Up, t0 + Duration::from_millis(600)))
            .is_none());
        assert_eq!(anim.state(), AnimationState::Idle);
    }

    #[test]
    fn test_touch_extends_activity() {
        let t0 = Instant::now();
        let mut anim = Animator::new(Duration::from_millis(500), t0);
        anim.on_event(&ev(key(0x1E), Paw::Left, Edge::Down, t0));
        anim.touch(t0 + Duration::from_millis(400));
        assert!(anim.tick(t0 + Duration::from_millis(800)).is_none());
        assert!(anim.tick(t0 + Duration::from_millis(900)).is_some());
    }

    #[test]
    fn test_idle_tick_is_noop() {
        let t0 = Instant::now();
        let mut anim = Animator::new(Duration::from_millis(100), t0);
        assert!(anim.tick(t0 + Duration::from_secs(5)).is_none());
        assert_eq!(anim.last_transition(), t0);
    }

    #[test]
    fn test_release_where_lifts_matching_inputs() {
        use crate::types::MouseButton;
        let t0 = Instant::now();
        let mut anim = Animator::new(DEFAULT_IDLE_TIMEOUT, t0);
        let click = InputSource::Mouse(MouseButton::Left);
        anim.on_event(&ev(click, Paw::Left, Edge::Down, t0));
        anim.on_event(&ev(key(0x26), Paw::Right, Edge::Down, t0));
        assert_eq!(anim.state(), AnimationState::BothDown);

        let tr = anim.release_where(InputSource::is_mouse, t0).unwrap();
        assert_eq!(tr.to, AnimationState::RightDown);
        assert!(anim.release_where(InputSource::is_mouse, t0).is_none());
    }
}
