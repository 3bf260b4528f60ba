// Control loop: request feedback -> decode -> decide -> command -> sleep
//
// Owns the link for its whole lifetime. Nothing that goes wrong inside a
// cycle ends the loop; only the running flag does.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::link::{JsonLink, decode_feedback};
use crate::messages::{FeedbackRequest, MotionCommand, SensorSample};
use crate::policy::{SpeedProfile, decide};

/// What a single control cycle ended with
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cycle {
    /// Feedback decoded and a command was written
    Commanded(MotionCommand),
    /// Feedback decoded but writing the command failed
    SendFailed(MotionCommand),
    /// Nothing arrived within the read timeout
    NoFeedback,
    /// A line arrived but could not be decoded, or the read failed
    BadFeedback,
}

pub struct Controller<S: Read + Write> {
    link: JsonLink<S>,
    profile: SpeedProfile,
    cycle_delay: Duration,
}

impl<S: Read + Write> Controller<S> {
    pub fn new(link: JsonLink<S>, profile: SpeedProfile, cycle_delay: Duration) -> Self {
        Self {
            link,
            profile,
            cycle_delay,
        }
    }

    /// Run one request/response/command cycle (without the sleep)
    pub fn step(&mut self) -> Cycle {
        // The reply may still come if the request write failed, so read anyway
        if let Err(e) = self.link.send(&FeedbackRequest::default()) {
            warn!("Failed to send feedback request: {}", e);
        }

        let line = match self.link.receive() {
            Ok(Some(line)) => line,
            Ok(None) => return Cycle::NoFeedback,
            Err(e) => {
                warn!("Failed to read feedback: {}", e);
                return Cycle::BadFeedback;
            }
        };

        let feedback = match decode_feedback(&line) {
            Ok(feedback) => feedback,
            Err(e) => {
                warn!("{}", e);
                return Cycle::BadFeedback;
            }
        };

        let (left, right) = feedback.samples();
        if left == SensorSample::Missing || right == SensorSample::Missing {
            warn!(
                "Feedback without line sensor data (L={:?}, R={:?}), applying {:?} policy",
                left, right, self.profile.on_missing
            );
        }

        let command = decide(left, right, &self.profile);
        match self.link.send(&command) {
            Ok(()) => Cycle::Commanded(command),
            Err(e) => {
                warn!("Failed to send command: {}", e);
                Cycle::SendFailed(command)
            }
        }
    }

    /// Cycle until `running` is cleared, then stop the robot and release the link
    pub fn run(mut self, running: &AtomicBool) {
        info!(
            "Line follower started: max {:.2}, turn {:.2}, {}ms cycle",
            self.profile.max_speed,
            self.profile.turn_speed,
            self.cycle_delay.as_millis()
        );

        while running.load(Ordering::SeqCst) {
            self.step();
            if !running.load(Ordering::SeqCst) {
                break;
            }
            thread::sleep(self.cycle_delay);
        }

        self.shutdown();
    }

    /// Best-effort stop command, then close the link whether or not it went out
    pub fn shutdown(mut self) {
        info!("Exiting, stopping robot");
        if let Err(e) = self.link.send(&MotionCommand::stop()) {
            warn!("Failed to send stop command: {}", e);
        }
        self.link.close();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    use super::*;
    use crate::link::mock::{MockPort, MockState, Reply};
    use crate::policy::MissingSensor;

    fn controller(replies: Vec<Reply>) -> (Controller<MockPort>, Rc<RefCell<MockState>>) {
        let (port, state) = MockPort::new(replies);
        let ctrl = Controller::new(JsonLink::new(port), SpeedProfile::default(), Duration::ZERO);
        (ctrl, state)
    }

    fn command(line: &str) -> MotionCommand {
        serde_json::from_str(line).unwrap()
    }

    #[test]
    fn test_left_line_steers_right() {
        let (mut ctrl, state) = controller(vec![Reply::line(r#"{"L":1,"R":0}"#)]);
        assert_eq!(ctrl.step(), Cycle::Commanded(MotionCommand::drive(0.3, 0.5)));

        let sent = state.borrow().sent_lines();
        assert_eq!(sent, vec![r#"{"T":130}"#, r#"{"T":1,"L":0.3,"R":0.5}"#]);
    }

    #[test]
    fn test_timeout_sends_no_command() {
        let (mut ctrl, state) = controller(vec![Reply::Timeout]);
        assert_eq!(ctrl.step(), Cycle::NoFeedback);
        assert_eq!(state.borrow().sent_lines(), vec![r#"{"T":130}"#]);
    }

    #[test]
    fn test_malformed_feedback_keeps_cycling() {
        let (mut ctrl, state) = controller(vec![
            Reply::line("{\"L\":1,\"R\""),
            Reply::line(r#"{"L":0,"R":1}"#),
        ]);
        assert_eq!(ctrl.step(), Cycle::BadFeedback);
        assert_eq!(ctrl.step(), Cycle::Commanded(MotionCommand::drive(0.5, 0.3)));

        let sent = state.borrow().sent_lines();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0], r#"{"T":130}"#);
        assert_eq!(sent[1], r#"{"T":130}"#);
        assert_eq!(command(&sent[2]), MotionCommand::drive(0.5, 0.3));
    }

    #[test]
    fn test_request_write_failure_still_reads_reply() {
        let (mut ctrl, state) = controller(vec![Reply::line(r#"{"L":1,"R":1}"#)]);
        state.borrow_mut().failing_writes = 1;
        assert_eq!(ctrl.step(), Cycle::Commanded(MotionCommand::stop()));
    }

    #[test]
    fn test_command_write_failure_is_not_fatal() {
        let (mut ctrl, state) = controller(vec![
            Reply::line(r#"{"L":0,"R":0}"#),
            Reply::line(r#"{"L":1,"R":1}"#),
        ]);
        state.borrow_mut().skip_writes = 1;
        state.borrow_mut().failing_writes = 1;

        assert_eq!(ctrl.step(), Cycle::SendFailed(MotionCommand::drive(0.5, 0.5)));
        assert_eq!(ctrl.step(), Cycle::Commanded(MotionCommand::stop()));
    }

    #[test]
    fn test_missing_fields_follow_policy() {
        let (mut ctrl, _state) = controller(vec![Reply::line(r#"{"T":1001,"odl":3}"#)]);
        assert_eq!(ctrl.step(), Cycle::Commanded(MotionCommand::drive(0.5, 0.5)));

        let (port, _state) = MockPort::new(vec![Reply::line(r#"{"T":1001,"odl":3}"#)]);
        let profile = SpeedProfile {
            on_missing: MissingSensor::Stop,
            ..SpeedProfile::default()
        };
        let mut ctrl = Controller::new(JsonLink::new(port), profile, Duration::ZERO);
        assert_eq!(ctrl.step(), Cycle::Commanded(MotionCommand::stop()));
    }

    #[test]
    fn test_null_sensor_value_stops() {
        let (mut ctrl, state) = controller(vec![Reply::line(r#"{"L":null,"R":0}"#)]);
        assert_eq!(ctrl.step(), Cycle::Commanded(MotionCommand::stop()));

        let sent = state.borrow().sent_lines();
        assert!(command(&sent[1]).is_stop());
    }

    #[test]
    fn test_run_stops_robot_before_release() {
        let running = Arc::new(AtomicBool::new(true));
        let (ctrl, state) = controller(vec![
            Reply::line(r#"{"L":0,"R":0}"#),
            Reply::line("not json"),
            Reply::Timeout,
            Reply::line(r#"{"L":1,"R":0}"#),
        ]);
        // the port clears the flag once the script runs dry, like an interrupt
        state.borrow_mut().running = Some(Arc::clone(&running));

        ctrl.run(&running);

        let state = state.borrow();
        assert!(state.closed);
        assert_eq!(state.closed_after_writes, Some(state.written.len()));

        let sent = state.sent_lines();
        let (requests, commands): (Vec<_>, Vec<_>) =
            sent.iter().partition(|l| l.as_str() == r#"{"T":130}"#);
        // four scripted cycles plus the one that hit the end of the script
        assert_eq!(requests.len(), 5);

        let commands: Vec<MotionCommand> = commands.iter().map(|l| command(l.as_str())).collect();
        assert_eq!(
            commands,
            vec![
                MotionCommand::drive(0.5, 0.5),
                MotionCommand::drive(0.3, 0.5),
                MotionCommand::stop(),
            ]
        );
        assert!(command(sent.last().unwrap()).is_stop());
    }

    #[test]
    fn test_run_exits_immediately_when_not_running() {
        let running = AtomicBool::new(false);
        let (ctrl, state) = controller(vec![]);
        ctrl.run(&running);

        let state = state.borrow();
        assert_eq!(state.sent_lines().len(), 1);
        assert!(command(&state.sent_lines()[0]).is_stop());
        assert!(state.closed);
    }

    #[test]
    fn test_shutdown_releases_even_if_stop_fails() {
        let (ctrl, state) = controller(vec![]);
        state.borrow_mut().failing_writes = 1;
        ctrl.shutdown();

        let state = state.borrow();
        assert!(state.written.is_empty());
        assert!(state.closed);
    }
}
