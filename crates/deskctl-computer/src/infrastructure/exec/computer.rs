//! ExecBackedComputer: normalized operations as xdotool command lines.
//!
//! Every operation becomes one or more shell scripts run inside the container
//! with `docker compose exec -T <container> sh -c <script>`.  The script is
//! passed as a single argument, so only values interpolated *into* the script
//! need quoting.  Commands that touch the display are prefixed with
//! `DISPLAY='<display>'`.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use deskctl_core::keymap::{wheel_steps, xdotool_button, KeyMapper};
use deskctl_core::{ComputerConfig, Dimensions, NormalizedInputEvent, Point};
use tracing::{debug, info};

use crate::application::computer::{ComputerBackend, ComputerError};
use crate::application::screenshot::RawCapture;
use crate::infrastructure::exec::runner::{CommandRunner, ExecError, TokioCommandRunner};

/// Where `import` writes the frame inside the container.
const CONTAINER_SCREENSHOT_PATH: &str = "/tmp/screenshot.png";

/// Pause between pointer moves while dragging.
const DRAG_STEP_DELAY: Duration = Duration::from_millis(10);

impl From<ExecError> for ComputerError {
    fn from(e: ExecError) -> Self {
        ComputerError::Transport(e.to_string())
    }
}

/// Drives a virtual X display inside a Docker Compose service.
pub struct ExecBackedComputer<R = TokioCommandRunner> {
    runner: R,
    display: String,
    container: String,
}

impl ExecBackedComputer<TokioCommandRunner> {
    /// Uses real `docker` processes with the default timeout.
    pub fn from_config(config: &ComputerConfig) -> Self {
        Self::new(config, TokioCommandRunner::default())
    }
}

impl<R: CommandRunner> ExecBackedComputer<R> {
    pub fn new(config: &ComputerConfig, runner: R) -> Self {
        Self {
            runner,
            display: config.display_or_default().to_string(),
            container: config.container_or_default().to_string(),
        }
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// Fails unless the compose service is running.
    ///
    /// # Errors
    ///
    /// Returns [`ComputerError::ContainerNotRunning`] when `docker compose ps`
    /// lists no matching container, or a transport error if docker itself fails.
    pub async fn ensure_running(&self) -> Result<(), ComputerError> {
        let args = vec![
            "compose".to_string(),
            "ps".to_string(),
            "-q".to_string(),
            "-f".to_string(),
            format!("name={}", self.container),
        ];
        let out = self.runner.run("docker", &args).await?;
        if String::from_utf8_lossy(&out).trim().is_empty() {
            return Err(ComputerError::ContainerNotRunning(self.container.clone()));
        }
        info!(container = %self.container, "container is running");
        Ok(())
    }

    /// Runs `script` inside the container and returns its stdout.
    async fn exec(&self, script: &str) -> Result<Vec<u8>, ComputerError> {
        debug!(container = %self.container, script, "docker compose exec");
        let args = vec![
            "compose".to_string(),
            "exec".to_string(),
            "-T".to_string(),
            self.container.clone(),
            "sh".to_string(),
            "-c".to_string(),
            script.to_string(),
        ];
        Ok(self.runner.run("docker", &args).await?)
    }

    fn xdotool_script(&self, args: &str) -> String {
        format!("DISPLAY={} xdotool {args}", shell_quote(&self.display))
    }

    async fn xdotool(&self, args: &str) -> Result<(), ComputerError> {
        self.exec(&self.xdotool_script(args)).await.map(|_| ())
    }

    async fn drag(&self, path: &[Point]) -> Result<(), ComputerError> {
        let Some((first, rest)) = path.split_first() else {
            return Ok(());
        };
        if rest.is_empty() {
            return Ok(());
        }
        self.xdotool(&format!("mousemove {} {}", first.x, first.y))
            .await?;
        self.xdotool("mousedown 1").await?;
        for point in rest {
            self.xdotool(&format!("mousemove {} {}", point.x, point.y))
                .await?;
            tokio::time::sleep(DRAG_STEP_DELAY).await;
        }
        self.xdotool("mouseup 1").await
    }
}

#[async_trait]
impl<R: CommandRunner> ComputerBackend for ExecBackedComputer<R> {
    fn name(&self) -> &'static str {
        "exec"
    }

    async fn apply(&self, event: &NormalizedInputEvent) -> Result<(), ComputerError> {
        match event {
            NormalizedInputEvent::Click { at, button } => {
                self.xdotool(&format!(
                    "mousemove {} {} click {}",
                    at.x,
                    at.y,
                    xdotool_button(*button)
                ))
                .await
            }
            NormalizedInputEvent::DoubleClick { at } => {
                self.xdotool(&format!(
                    "mousemove {} {} click --repeat 2 --delay 100 1",
                    at.x, at.y
                ))
                .await
            }
            NormalizedInputEvent::Move { to } => {
                self.xdotool(&format!("mousemove {} {}", to.x, to.y)).await
            }
            NormalizedInputEvent::Scroll { at, dx, dy } => {
                self.xdotool(&format!("mousemove {} {}", at.x, at.y)).await?;
                for step in wheel_steps(*dx, *dy) {
                    self.xdotool(&format!(
                        "click --repeat {} {}",
                        step.ticks,
                        step.direction.xdotool_button()
                    ))
                    .await?;
                }
                Ok(())
            }
            NormalizedInputEvent::Type { text } => {
                self.xdotool(&format!("type -- {}", shell_quote(text))).await
            }
            NormalizedInputEvent::KeyPress { keys } => {
                if keys.is_empty() {
                    return Ok(());
                }
                let combo = KeyMapper::xdotool_combo(keys.as_slice());
                self.xdotool(&format!("key {}", shell_quote(&combo))).await
            }
            NormalizedInputEvent::Drag { path } => self.drag(path).await,
        }
    }

    async fn capture(&self) -> Result<RawCapture, ComputerError> {
        let script = format!(
            "DISPLAY={display} import -window root {path} && base64 -w 0 {path}",
            display = shell_quote(&self.display),
            path = CONTAINER_SCREENSHOT_PATH
        );
        let out = self.exec(&script).await?;
        let text = String::from_utf8_lossy(&out);
        Ok(match general_purpose::STANDARD.decode(text.trim()) {
            Ok(png) => RawCapture::Encoded(png),
            Err(e) => RawCapture::Corrupt(format!("screenshot transfer is not base64: {e}")),
        })
    }

    async fn wait(&self, ms: u64) -> Result<(), ComputerError> {
        self.exec(&format!("sleep {:.3}", ms as f64 / 1000.0))
            .await
            .map(|_| ())
    }

    async fn query_dimensions(&self) -> Result<Option<Dimensions>, ComputerError> {
        match self.exec(&self.xdotool_script("getdisplaygeometry")).await {
            Ok(out) => {
                if let Some(dims) = Dimensions::parse_xdotool_geometry(&String::from_utf8_lossy(&out)) {
                    return Ok(Some(dims));
                }
                debug!("xdotool printed no geometry; trying xdpyinfo");
            }
            Err(e) => debug!("xdotool geometry query failed ({e}); trying xdpyinfo"),
        }
        let out = self
            .exec(&format!(
                "xdpyinfo -display {} | grep dimensions",
                shell_quote(&self.display)
            ))
            .await?;
        Ok(Dimensions::parse_xdpyinfo(&String::from_utf8_lossy(&out)))
    }

    async fn close(&self) -> Result<(), ComputerError> {
        Ok(())
    }
}

/// Wraps `s` in single quotes for `sh`, escaping embedded single quotes.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::exec::runner::MockCommandRunner;
    use deskctl_core::PointerButton;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// A mock runner that records every script passed to `sh -c` and replies
    /// with `outputs` in order (empty stdout once they run out).
    fn scripted_runner(
        outputs: Vec<Result<Vec<u8>, ExecError>>,
    ) -> (MockCommandRunner, Arc<Mutex<Vec<String>>>) {
        let scripts = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&scripts);
        let outputs = Mutex::new(VecDeque::from(outputs));
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(move |program, args| {
            assert_eq!(program, "docker");
            log.lock().unwrap().push(args.join(" "));
            outputs.lock().unwrap().pop_front().unwrap_or(Ok(Vec::new()))
        });
        (runner, scripts)
    }

    fn computer(runner: MockCommandRunner) -> ExecBackedComputer<MockCommandRunner> {
        ExecBackedComputer::new(&ComputerConfig::exec(":99", "computer"), runner)
    }

    fn exec_line(script: &str) -> String {
        format!("compose exec -T computer sh -c {script}")
    }

    #[tokio::test]
    async fn test_click_builds_mousemove_and_click() {
        // Arrange
        let (runner, scripts) = scripted_runner(vec![]);
        let pc = computer(runner);

        // Act
        pc.apply(&NormalizedInputEvent::Click {
            at: Point::new(100, 200),
            button: PointerButton::Right,
        })
        .await
        .unwrap();

        // Assert
        assert_eq!(
            *scripts.lock().unwrap(),
            vec![exec_line("DISPLAY=':99' xdotool mousemove 100 200 click 3")]
        );
    }

    #[tokio::test]
    async fn test_back_button_is_supported() {
        let (runner, scripts) = scripted_runner(vec![]);
        let pc = computer(runner);

        pc.apply(&NormalizedInputEvent::Click {
            at: Point::new(1, 2),
            button: PointerButton::Back,
        })
        .await
        .unwrap();

        assert!(scripts.lock().unwrap()[0].ends_with("click 8"));
    }

    #[tokio::test]
    async fn test_double_click_uses_repeat_with_delay() {
        let (runner, scripts) = scripted_runner(vec![]);
        let pc = computer(runner);

        pc.apply(&NormalizedInputEvent::DoubleClick {
            at: Point::new(5, 6),
        })
        .await
        .unwrap();

        assert!(scripts.lock().unwrap()[0]
            .ends_with("xdotool mousemove 5 6 click --repeat 2 --delay 100 1"));
    }

    #[tokio::test]
    async fn test_scroll_down_25_issues_two_ticks_of_button_5() {
        // Arrange
        let (runner, scripts) = scripted_runner(vec![]);
        let pc = computer(runner);

        // Act
        pc.apply(&NormalizedInputEvent::Scroll {
            at: Point::new(10, 20),
            dx: 0,
            dy: 25,
        })
        .await
        .unwrap();

        // Assert
        assert_eq!(
            *scripts.lock().unwrap(),
            vec![
                exec_line("DISPLAY=':99' xdotool mousemove 10 20"),
                exec_line("DISPLAY=':99' xdotool click --repeat 2 5"),
            ]
        );
    }

    #[tokio::test]
    async fn test_scroll_small_left_delta_is_one_tick_of_button_6() {
        let (runner, scripts) = scripted_runner(vec![]);
        let pc = computer(runner);

        pc.apply(&NormalizedInputEvent::Scroll {
            at: Point::new(0, 0),
            dx: -5,
            dy: 0,
        })
        .await
        .unwrap();

        assert_eq!(
            scripts.lock().unwrap()[1],
            exec_line("DISPLAY=':99' xdotool click --repeat 1 6")
        );
    }

    #[tokio::test]
    async fn test_type_quotes_single_quotes() {
        let (runner, scripts) = scripted_runner(vec![]);
        let pc = computer(runner);

        pc.apply(&NormalizedInputEvent::Type {
            text: "it's \"fine\" $HOME".to_string(),
        })
        .await
        .unwrap();

        assert_eq!(
            scripts.lock().unwrap()[0],
            exec_line(r#"DISPLAY=':99' xdotool type -- 'it'\''s "fine" $HOME'"#)
        );
    }

    #[tokio::test]
    async fn test_keypress_combo_is_lowercased_and_joined() {
        let (runner, scripts) = scripted_runner(vec![]);
        let pc = computer(runner);

        pc.apply(&NormalizedInputEvent::KeyPress {
            keys: vec!["A".into(), "B".into()],
        })
        .await
        .unwrap();

        assert_eq!(
            scripts.lock().unwrap()[0],
            exec_line("DISPLAY=':99' xdotool key 'a+b'")
        );
    }

    #[tokio::test]
    async fn test_keypress_maps_named_keys() {
        let (runner, scripts) = scripted_runner(vec![]);
        let pc = computer(runner);

        pc.apply(&NormalizedInputEvent::KeyPress {
            keys: vec!["CTRL".into(), "ENTER".into()],
        })
        .await
        .unwrap();

        assert!(scripts.lock().unwrap()[0].ends_with("xdotool key 'ctrl+Return'"));
    }

    #[tokio::test]
    async fn test_drag_presses_moves_and_releases() {
        // Arrange
        let (runner, scripts) = scripted_runner(vec![]);
        let pc = computer(runner);

        // Act
        pc.apply(&NormalizedInputEvent::Drag {
            path: vec![Point::new(0, 0), Point::new(5, 5), Point::new(10, 10)],
        })
        .await
        .unwrap();

        // Assert
        let scripts = scripts.lock().unwrap();
        let tails: Vec<&str> = scripts
            .iter()
            .map(|s| s.rsplit("xdotool ").next().unwrap_or_default())
            .collect();
        assert_eq!(
            tails,
            vec![
                "mousemove 0 0",
                "mousedown 1",
                "mousemove 5 5",
                "mousemove 10 10",
                "mouseup 1"
            ]
        );
    }

    #[tokio::test]
    async fn test_single_point_drag_runs_nothing() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().never();
        let pc = computer(runner);

        pc.apply(&NormalizedInputEvent::Drag {
            path: vec![Point::new(1, 1)],
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_wait_sleeps_inside_container() {
        let (runner, scripts) = scripted_runner(vec![]);
        let pc = computer(runner);

        pc.wait(250).await.unwrap();

        assert_eq!(scripts.lock().unwrap()[0], exec_line("sleep 0.250"));
    }

    #[tokio::test]
    async fn test_capture_decodes_base64_stdout() {
        // Arrange
        let png = vec![0x89, b'P', b'N', b'G'];
        let encoded = general_purpose::STANDARD.encode(&png);
        let (runner, scripts) = scripted_runner(vec![Ok(format!("{encoded}\n").into_bytes())]);
        let pc = computer(runner);

        // Act
        let capture = pc.capture().await.unwrap();

        // Assert
        assert_eq!(capture, RawCapture::Encoded(png));
        assert!(scripts.lock().unwrap()[0].contains("import -window root /tmp/screenshot.png"));
    }

    #[tokio::test]
    async fn test_capture_with_garbage_output_is_corrupt_not_error() {
        let (runner, _) = scripted_runner(vec![Ok(b"import: unable to open X server".to_vec())]);
        let pc = computer(runner);

        let capture = pc.capture().await.unwrap();

        assert!(matches!(capture, RawCapture::Corrupt(_)));
    }

    #[tokio::test]
    async fn test_dimensions_prefer_xdotool_geometry() {
        let (runner, scripts) = scripted_runner(vec![Ok(b"1280 800\n".to_vec())]);
        let pc = computer(runner);

        let dims = pc.query_dimensions().await.unwrap();

        assert_eq!(dims, Some(Dimensions::new(1280, 800)));
        assert_eq!(scripts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dimensions_fall_back_to_xdpyinfo() {
        // Arrange – xdotool fails, xdpyinfo answers
        let (runner, scripts) = scripted_runner(vec![
            Err(ExecError::Failed {
                program: "docker".into(),
                status: "exit status: 1".into(),
                stderr: "xdotool: not found".into(),
            }),
            Ok(b"  dimensions:    1024x600 pixels (270x158 millimeters)\n".to_vec()),
        ]);
        let pc = computer(runner);

        // Act
        let dims = pc.query_dimensions().await.unwrap();

        // Assert
        assert_eq!(dims, Some(Dimensions::new(1024, 600)));
        assert_eq!(
            scripts.lock().unwrap()[1],
            exec_line("xdpyinfo -display ':99' | grep dimensions")
        );
    }

    #[tokio::test]
    async fn test_ensure_running_rejects_missing_container() {
        let (runner, scripts) = scripted_runner(vec![Ok(b"\n".to_vec())]);
        let pc = computer(runner);

        let result = pc.ensure_running().await;

        assert!(matches!(result, Err(ComputerError::ContainerNotRunning(c)) if c == "computer"));
        assert_eq!(scripts.lock().unwrap()[0], "compose ps -q -f name=computer");
    }

    #[tokio::test]
    async fn test_ensure_running_accepts_listed_container() {
        let (runner, _) = scripted_runner(vec![Ok(b"3f2a9c\n".to_vec())]);
        let pc = computer(runner);
        assert!(pc.ensure_running().await.is_ok());
    }

    #[tokio::test]
    async fn test_exec_failure_surfaces_as_transport_error() {
        let (runner, _) = scripted_runner(vec![Err(ExecError::Timeout {
            program: "docker".into(),
            after: Duration::from_secs(30),
        })]);
        let pc = computer(runner);

        let result = pc
            .apply(&NormalizedInputEvent::Move {
                to: Point::new(1, 1),
            })
            .await;

        assert!(matches!(result, Err(ComputerError::Transport(_))));
    }

    #[tokio::test]
    async fn test_hostile_display_stays_one_shell_word() {
        // Arrange
        let (runner, scripts) = scripted_runner(vec![Ok(Vec::new()), Ok(Vec::new())]);
        let pc = ExecBackedComputer::new(&ComputerConfig::exec(":1; rm -rf /", "computer"), runner);

        // Act
        pc.apply(&NormalizedInputEvent::Move {
            to: Point::new(1, 1),
        })
        .await
        .unwrap();
        let _ = pc.capture().await.unwrap();

        // Assert
        let scripts = scripts.lock().unwrap();
        assert_eq!(
            scripts[0],
            exec_line("DISPLAY=':1; rm -rf /' xdotool mousemove 1 1")
        );
        assert!(scripts[1].starts_with(&exec_line("DISPLAY=':1; rm -rf /' import -window root")));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("a'b"), r"'a'\''b'");
    }
}
