//! Extractor subprocess manager
//!
//! Launches the external pose-estimation process and reads its
//! newline-delimited JSON detections from stdout. The child is killed when
//! the manager is dropped.

use std::io::BufReader;
use std::process::{Child, ChildStdout, Command, Stdio};

use crate::config::ExtractorConfig;
use crate::error::CaptureError;
use crate::tracking::extractor::{DetectionSource, FrameEvent, NdjsonSource, SourceInfo};

/// Running extractor process
pub struct ExtractorProcess {
    child: Child,
    stream: NdjsonSource<BufReader<ChildStdout>>,
}

impl ExtractorProcess {
    /// Launch the extractor for `source` (a camera index or a video path).
    ///
    /// Runs: `<command> <args...> --source <source>`. The process must print a
    /// `source` header line once the video is open; exiting before producing
    /// any output is reported as an unopenable source.
    pub fn spawn(config: &ExtractorConfig, source: &str) -> Result<Self, CaptureError> {
        let mut child = Command::new(&config.command)
            .args(&config.args)
            .args(["--source", source])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                CaptureError::Subprocess(format!(
                    "Failed to launch extractor '{}': {}",
                    config.command, e
                ))
            })?;

        tracing::info!(
            "Extractor subprocess started (pid: {}, source: {})",
            child.id(),
            source
        );

        let stdout = match child.stdout.take() {
            Some(out) => out,
            None => {
                let _ = child.kill();
                return Err(CaptureError::Subprocess(
                    "Extractor stdout was not captured".to_string(),
                ));
            }
        };

        let stream = match NdjsonSource::new(BufReader::new(stdout)) {
            Ok(stream) => stream,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        };

        let mut process = Self { child, stream };

        if !process.stream.opened() {
            // stdout closed without a single line: the source never opened
            let reason = match process.child.wait() {
                Ok(status) => format!("extractor exited with {}", status),
                Err(e) => format!("extractor could not be reaped ({})", e),
            };
            return Err(CaptureError::SourceUnavailable(format!(
                "{} before opening '{}'",
                reason, source
            )));
        }

        Ok(process)
    }

    /// Check if the subprocess is still running (non-blocking)
    pub fn is_running(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                tracing::debug!("Extractor subprocess exited with: {}", status);
                false
            }
            Err(e) => {
                tracing::error!("Failed to check extractor status: {}", e);
                false
            }
        }
    }

    /// Kill the subprocess and reap it
    pub fn stop(&mut self) {
        if self.is_running() {
            tracing::info!("Stopping extractor subprocess (pid: {})", self.child.id());
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

impl DetectionSource for ExtractorProcess {
    fn source_info(&self) -> &SourceInfo {
        self.stream.source_info()
    }

    fn next_event(&mut self) -> Result<Option<FrameEvent>, CaptureError> {
        self.stream.next_event()
    }
}

impl Drop for ExtractorProcess {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str) -> ExtractorConfig {
        ExtractorConfig {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string(), "extractor".to_string()],
        }
    }

    #[test]
    fn test_reads_child_stdout() {
        let config = shell(
            r#"echo '{"type":"source","fps":24,"width":320,"height":240}'; echo '{"type":"frame","body":null}'"#,
        );
        let mut process = ExtractorProcess::spawn(&config, "0").unwrap();
        assert_eq!(process.source_info().width, 320);
        assert!(matches!(
            process.next_event().unwrap(),
            Some(FrameEvent::Detected(_))
        ));
        assert!(process.next_event().unwrap().is_none());
    }

    #[test]
    fn test_failed_open_is_fatal() {
        let config = shell("echo 'cannot open' >&2; exit 3");
        let result = ExtractorProcess::spawn(&config, "missing.mp4");
        assert!(matches!(result, Err(CaptureError::SourceUnavailable(_))));
    }

    #[test]
    fn test_clean_exit_without_output_is_fatal() {
        let config = shell("exit 0");
        match ExtractorProcess::spawn(&config, "empty.mp4") {
            Err(CaptureError::SourceUnavailable(message)) => {
                assert!(message.contains("empty.mp4"));
            }
            other => panic!("expected SourceUnavailable, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_missing_binary() {
        let config = ExtractorConfig {
            command: "/nonexistent/posepipe-extractor".to_string(),
            args: Vec::new(),
        };
        assert!(matches!(
            ExtractorProcess::spawn(&config, "0"),
            Err(CaptureError::Subprocess(_))
        ));
    }
}
