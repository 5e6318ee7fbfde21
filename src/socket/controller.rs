//! Power state machine.
//!
//! Keeps the believed power state of the socket in sync with audio
//! activity: power on immediately when playback starts, power off only
//! after playback has been absent for longer than the configured delay.
//! The delay suppresses power cycling during the short silences between
//! tracks; the off timer is anchored at the first observed silence and is
//! cancelled outright when playback resumes.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use super::error::SocketError;

/// Number of power-off attempts made at startup before giving up.
const INIT_OFF_ATTEMPTS: u32 = 10;

/// Backoff between startup power-off attempts.
const INIT_OFF_BACKOFF: Duration = Duration::from_secs(10);

/// The seam between the state machine and the wire.
///
/// Commands must be idempotent: the controller resends a command on the
/// next tick whenever one fails.
pub trait PowerSwitch {
    async fn power_on(&self) -> Result<(), SocketError>;
    async fn power_off(&self) -> Result<(), SocketError>;
}

/// The state machine that drives one power socket.
///
/// Driven synchronously, one `tick` at a time, by a single polling loop;
/// at most one command is issued per tick and the two fields below are
/// never touched from anywhere else.
pub struct PowerController<S> {
    switch: S,
    /// Delay between the first observed silence and the off command.
    off_delay: Duration,
    /// Last power state a command successfully confirmed. Not ground truth
    /// if the device was toggled behind our back; no read-back is done.
    believed_on: bool,
    /// Start of the current cooldown window. `None` while audio plays and
    /// while the socket is believed off.
    pending_off_since: Option<Instant>,
}

impl<S: PowerSwitch> PowerController<S> {
    pub fn new(switch: S, off_delay: Duration) -> Self {
        Self {
            switch,
            off_delay,
            believed_on: false,
            pending_off_since: None,
        }
    }

    /// The last power state this controller confirmed it set.
    pub fn believed_on(&self) -> bool {
        self.believed_on
    }

    /// Force the socket off before trusting any state.
    ///
    /// The socket's real state at process start is unknown (a prior crash
    /// may have left it on), so we insist on an off command up front. If
    /// every attempt fails, initialization still completes and the
    /// controller optimistically assumes the socket is off; staying up
    /// matters more here than certainty, and the first playing tick will
    /// issue a fresh command anyway.
    pub async fn initialize(&mut self) {
        for attempt in 1..=INIT_OFF_ATTEMPTS {
            match self.switch.power_off().await {
                Ok(()) => {
                    info!(attempt, "socket forced off at startup");
                    return;
                }
                Err(e) => {
                    warn!(attempt, "startup power-off failed: {e}");
                }
            }

            if attempt < INIT_OFF_ATTEMPTS {
                sleep(INIT_OFF_BACKOFF).await;
            }
        }

        warn!(
            attempts = INIT_OFF_ATTEMPTS,
            "could not confirm socket off at startup, assuming off"
        );
    }

    /// Advance the state machine with the latest audio observation.
    ///
    /// Must be called periodically. A returned error means the command for
    /// this tick failed; state is left so that the next tick retries it.
    pub async fn tick(&mut self, audio_playing: bool) -> Result<(), SocketError> {
        // Already in the desired state: nothing to do, and any running
        // cooldown is stale.
        if audio_playing == self.believed_on {
            self.pending_off_since = None;
            return Ok(());
        }

        if audio_playing {
            // Playback started while the socket is off: turn on now. On
            // failure nothing changes; audio will still be playing next
            // tick.
            self.switch.power_on().await?;
            self.believed_on = true;
            self.pending_off_since = None;
            info!("socket turned on");
            return Ok(());
        }

        // Silence while the socket is on: run the cooldown, anchored at
        // the first silent tick.
        let since = *self.pending_off_since.get_or_insert_with(Instant::now);

        if since.elapsed() > self.off_delay {
            // A failed off command leaves the anchor untouched, so the
            // deadline is not pushed out by the failure.
            self.switch.power_off().await?;
            self.believed_on = false;
            self.pending_off_since = None;
            info!("socket turned off");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tokio::time::advance;

    use super::*;

    /// Scripted switch: counts commands and fails the next N of each kind.
    #[derive(Default)]
    struct MockSwitch {
        on_calls: Mutex<u32>,
        off_calls: Mutex<u32>,
        fail_next_on: Mutex<u32>,
        fail_next_off: Mutex<u32>,
    }

    impl MockSwitch {
        fn on_calls(&self) -> u32 {
            *self.on_calls.lock().unwrap()
        }

        fn off_calls(&self) -> u32 {
            *self.off_calls.lock().unwrap()
        }

        fn fail_next_off(&self, count: u32) {
            *self.fail_next_off.lock().unwrap() = count;
        }

        fn fail_next_on(&self, count: u32) {
            *self.fail_next_on.lock().unwrap() = count;
        }

        fn rejected() -> SocketError {
            SocketError::CommandRejected(reqwest::StatusCode::INTERNAL_SERVER_ERROR)
        }
    }

    impl PowerSwitch for &MockSwitch {
        async fn power_on(&self) -> Result<(), SocketError> {
            *self.on_calls.lock().unwrap() += 1;
            let mut fail = self.fail_next_on.lock().unwrap();
            if *fail > 0 {
                *fail -= 1;
                return Err(MockSwitch::rejected());
            }
            Ok(())
        }

        async fn power_off(&self) -> Result<(), SocketError> {
            *self.off_calls.lock().unwrap() += 1;
            let mut fail = self.fail_next_off.lock().unwrap();
            if *fail > 0 {
                *fail -= 1;
                return Err(MockSwitch::rejected());
            }
            Ok(())
        }
    }

    const DELAY: Duration = Duration::from_secs(10);

    fn controller(switch: &MockSwitch) -> PowerController<&MockSwitch> {
        PowerController::new(switch, DELAY)
    }

    #[tokio::test(start_paused = true)]
    async fn test_turns_on_immediately() {
        let switch = MockSwitch::default();
        let mut ctl = controller(&switch);

        ctl.tick(true).await.unwrap();

        assert!(ctl.believed_on());
        assert_eq!(switch.on_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_ticks_are_idempotent() {
        let switch = MockSwitch::default();
        let mut ctl = controller(&switch);

        for _ in 0..5 {
            ctl.tick(true).await.unwrap();
            advance(Duration::from_secs(1)).await;
        }

        assert_eq!(switch.on_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_off_only_after_delay_exceeded() {
        let switch = MockSwitch::default();
        let mut ctl = controller(&switch);
        ctl.tick(true).await.unwrap();

        // Silence for exactly the delay: still on.
        for _ in 0..11 {
            ctl.tick(false).await.unwrap();
            advance(Duration::from_secs(1)).await;
        }
        assert!(ctl.believed_on());
        assert_eq!(switch.off_calls(), 0);

        // One more second pushes elapsed strictly past the delay.
        ctl.tick(false).await.unwrap();
        assert!(!ctl.believed_on());
        assert_eq!(switch.off_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resumed_playback_cancels_cooldown() {
        let switch = MockSwitch::default();
        let mut ctl = controller(&switch);
        ctl.tick(true).await.unwrap();

        // Silence well into the window, then playback resumes.
        ctl.tick(false).await.unwrap();
        advance(Duration::from_secs(8)).await;
        ctl.tick(false).await.unwrap();
        ctl.tick(true).await.unwrap();
        assert_eq!(switch.on_calls(), 1); // still on, no new command

        // A fresh silence starts a new window independent of the old one;
        // 9 more seconds would have expired the cancelled window.
        ctl.tick(false).await.unwrap();
        advance(Duration::from_secs(9)).await;
        ctl.tick(false).await.unwrap();
        assert!(ctl.believed_on());
        assert_eq!(switch.off_calls(), 0);

        advance(Duration::from_secs(2)).await;
        ctl.tick(false).await.unwrap();
        assert!(!ctl.believed_on());
        assert_eq!(switch.off_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_off_keeps_original_deadline() {
        let switch = MockSwitch::default();
        let mut ctl = controller(&switch);
        ctl.tick(true).await.unwrap();

        ctl.tick(false).await.unwrap();
        advance(Duration::from_secs(11)).await;

        // Expiry reached, but the command fails: state unchanged.
        switch.fail_next_off(1);
        assert!(ctl.tick(false).await.is_err());
        assert!(ctl.believed_on());

        // Next tick succeeds against the same original deadline.
        advance(Duration::from_secs(1)).await;
        ctl.tick(false).await.unwrap();
        assert!(!ctl.believed_on());
        assert_eq!(switch.off_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_on_retried_next_tick() {
        let switch = MockSwitch::default();
        let mut ctl = controller(&switch);

        switch.fail_next_on(1);
        assert!(ctl.tick(true).await.is_err());
        assert!(!ctl.believed_on());

        ctl.tick(true).await.unwrap();
        assert!(ctl.believed_on());
        assert_eq!(switch.on_calls(), 2);
    }

    /// The worked example: delay 10 s, playback at t=0, silence from t=1.
    /// The off command lands at t=12, the first tick with elapsed > 10.
    #[tokio::test(start_paused = true)]
    async fn test_cooldown_boundary_is_strict() {
        let switch = MockSwitch::default();
        let mut ctl = controller(&switch);

        ctl.tick(true).await.unwrap(); // t=0
        advance(Duration::from_secs(1)).await;

        for _ in 1..=8 {
            ctl.tick(false).await.unwrap(); // t=1..8, anchor at t=1
            advance(Duration::from_secs(1)).await;
        }
        advance(Duration::from_secs(2)).await;

        ctl.tick(false).await.unwrap(); // t=11: 10 is not > 10
        assert!(ctl.believed_on());

        advance(Duration::from_secs(1)).await;
        ctl.tick(false).await.unwrap(); // t=12: 11 > 10
        assert!(!ctl.believed_on());
        assert_eq!(switch.off_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_retries_until_success() {
        let switch = MockSwitch::default();
        switch.fail_next_off(3);
        let mut ctl = controller(&switch);

        ctl.initialize().await;

        assert!(!ctl.believed_on());
        assert_eq!(switch.off_calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_gives_up_after_bound() {
        let switch = MockSwitch::default();
        switch.fail_next_off(u32::MAX);
        let mut ctl = controller(&switch);

        ctl.initialize().await;

        assert!(!ctl.believed_on());
        assert_eq!(switch.off_calls(), 10);
    }
}
