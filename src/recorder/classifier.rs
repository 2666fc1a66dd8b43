//! Termination classification
//!
//! FFmpeg's exit status alone does not say whether a recording worked: an
//! interrupted encoder may exit with 1 or 255 after writing a perfectly good
//! file, and a misconfigured one may keep running after printing a fatal
//! error. The classifier combines the exit status, the diagnostics seen while
//! the encoder ran and the size of the output file into one outcome.

use super::state::{TerminationOutcome, TerminationReason};
use crate::capture::CapturePlatform;
use std::path::Path;

/// Files at or below this size hold little more than a header
pub const MIN_AUDIO_FILE_BYTES: u64 = 1024;

/// Exit code of a process stopped by Ctrl+C
const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Exit codes FFmpeg uses when forced to stop. They do not say whether the
/// file is usable, so the file decides. This mirrors observed FFmpeg
/// behaviour rather than anything FFmpeg documents.
const AMBIGUOUS_EXIT_CODES: [i32; 2] = [1, 255];

#[cfg(unix)]
const SIGNAL_INTERRUPT: i32 = libc::SIGINT;
#[cfg(not(unix))]
const SIGNAL_INTERRUPT: i32 = 2;

/// Rolling amount of diagnostic text kept for classification
const CAPTURED_DIAGNOSTICS_LIMIT: usize = 16 * 1024;

const MACOS_LOOPBACK_DRIVER_HINT: &str = "\
No audio capture device was found.

To record system audio on macOS:
1. Install BlackHole: https://github.com/ExistentialAudio/BlackHole
2. Select BlackHole as the output device in System Settings
3. Try again";

const WINDOWS_WASAPI_UNSUPPORTED_HINT: &str = "\
Your FFmpeg build does not support WASAPI.

This happens with older FFmpeg versions.

Solutions:
1. Update the bundled FFmpeg to the latest release
2. Or install FFmpeg manually from https://ffmpeg.org/download.html
3. Make sure the installed FFmpeg build includes WASAPI support";

const WINDOWS_DEVICE_NOT_FOUND_HINT: &str = "\
The recording device could not be found.

Try:
1. Make sure audio is playing
2. Check the Windows sound settings
3. Restart the application";

const MACOS_SILENT_FILE_WARNING: &str = "\
Recording finished, but the file contains no audio.

To capture system audio on macOS:
1. Install BlackHole: https://github.com/ExistentialAudio/BlackHole
2. Select BlackHole as the output device in System Settings
3. Try again";

const SILENT_FILE_WARNING: &str =
    "Recording finished, but the file contains no audio. Check your sound settings.";

/// A known fatal diagnostic and the instructions shown for it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureSignature {
    pub platform: PlatformClass,
    pub pattern: &'static str,
    pub message: &'static str,
}

/// Platforms a signature applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformClass {
    Windows,
    MacOs,
}

impl PlatformClass {
    fn matches(self, platform: &CapturePlatform) -> bool {
        matches!(
            (self, platform),
            (Self::Windows, CapturePlatform::Windows) | (Self::MacOs, CapturePlatform::MacOs)
        )
    }
}

/// Fatal diagnostics recognized in the encoder's stderr, checked in order
pub const FAILURE_SIGNATURES: &[FailureSignature] = &[
    FailureSignature {
        platform: PlatformClass::MacOs,
        pattern: "No AV capture device found",
        message: MACOS_LOOPBACK_DRIVER_HINT,
    },
    FailureSignature {
        platform: PlatformClass::MacOs,
        pattern: "Input/output error",
        message: MACOS_LOOPBACK_DRIVER_HINT,
    },
    FailureSignature {
        platform: PlatformClass::Windows,
        pattern: "Unknown input format: 'wasapi'",
        message: WINDOWS_WASAPI_UNSUPPORTED_HINT,
    },
    FailureSignature {
        platform: PlatformClass::Windows,
        pattern: "Unknown input format: wasapi",
        message: WINDOWS_WASAPI_UNSUPPORTED_HINT,
    },
    FailureSignature {
        platform: PlatformClass::Windows,
        pattern: "Cannot find",
        message: WINDOWS_DEVICE_NOT_FOUND_HINT,
    },
];

/// First signature for `platform` found in `text`
pub fn match_failure_signature(
    platform: &CapturePlatform,
    text: &str,
) -> Option<&'static FailureSignature> {
    FAILURE_SIGNATURES
        .iter()
        .find(|signature| signature.platform.matches(platform) && text.contains(signature.pattern))
}

/// Hint shown when a recording produced an implausibly small file
pub fn silent_file_warning(platform: &CapturePlatform) -> &'static str {
    match platform {
        CapturePlatform::MacOs => MACOS_SILENT_FILE_WARNING,
        _ => SILENT_FILE_WARNING,
    }
}

/// Incremental scanner over the encoder's stderr
///
/// Chunks may split a signature, so the tail of each chunk is carried over
/// to the next. The scanner also keeps a rolling copy of the text for the
/// final classification.
#[derive(Debug)]
pub struct DiagnosticScanner {
    platform: CapturePlatform,
    carry: String,
    captured: String,
}

impl DiagnosticScanner {
    pub fn new(platform: CapturePlatform) -> Self {
        Self {
            platform,
            carry: String::new(),
            captured: String::new(),
        }
    }

    /// Record a chunk and report a fatal signature if one completed in it
    pub fn feed(&mut self, chunk: &str) -> Option<&'static FailureSignature> {
        self.capture(chunk);

        let mut window = std::mem::take(&mut self.carry);
        window.push_str(chunk);

        let found = match_failure_signature(&self.platform, &window);

        let keep = longest_pattern_len().saturating_sub(1);
        self.carry = tail(&window, keep).to_string();

        found
    }

    /// Record a chunk without scanning it
    pub fn capture(&mut self, chunk: &str) {
        self.captured.push_str(chunk);
        if self.captured.len() > CAPTURED_DIAGNOSTICS_LIMIT {
            self.captured = tail(&self.captured, CAPTURED_DIAGNOSTICS_LIMIT).to_string();
        }
    }

    pub fn captured(&self) -> &str {
        &self.captured
    }
}

fn longest_pattern_len() -> usize {
    FAILURE_SIGNATURES
        .iter()
        .map(|signature| signature.pattern.len())
        .max()
        .unwrap_or(0)
}

/// Last `max_bytes` of `text`, moved forward to a char boundary
fn tail(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }

    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

/// Size lookup for the recorded file
pub trait OutputProbe {
    /// Size in bytes, or None if the file does not exist
    fn size_of(&self, path: &Path) -> Option<u64>;
}

/// Probe backed by filesystem metadata
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

impl OutputProbe for FsProbe {
    fn size_of(&self, path: &Path) -> Option<u64> {
        std::fs::metadata(path)
            .ok()
            .filter(|metadata| metadata.is_file())
            .map(|metadata| metadata.len())
    }
}

/// Everything known about a finished encoder process
#[derive(Debug, Clone)]
pub struct TerminationReport<'a> {
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub output_path: &'a Path,
    pub platform: &'a CapturePlatform,
    pub diagnostics: &'a str,
    /// Set when the live scan killed the encoder
    pub live_failure: Option<&'a str>,
}

/// Decide how a session ended
pub fn classify(report: &TerminationReport<'_>, probe: &dyn OutputProbe) -> TerminationOutcome {
    if let Some(message) = report.live_failure {
        return TerminationOutcome::error(
            TerminationReason::LiveDiagnosticFailure,
            message.to_string(),
        );
    }

    let interrupted = report.signal == Some(SIGNAL_INTERRUPT);

    match report.exit_code {
        Some(0) | Some(EXIT_CODE_INTERRUPTED) => classify_clean_stop(report, probe),
        _ if interrupted => classify_clean_stop(report, probe),
        Some(code) if AMBIGUOUS_EXIT_CODES.contains(&code) => {
            classify_ambiguous_exit(report, code, probe)
        }
        Some(code) => TerminationOutcome::error(
            TerminationReason::EncoderFailure,
            failure_message(report, || {
                format!(
                    "Recording failed (FFmpeg exited with code {}). Make sure FFmpeg is installed and configured correctly.",
                    code
                )
            }),
        ),
        None => TerminationOutcome::error(
            TerminationReason::KilledBySignal,
            failure_message(report, || match report.signal {
                Some(signal) => format!("Recording stopped unexpectedly (FFmpeg was terminated by signal {}).", signal),
                None => "Recording stopped unexpectedly.".to_string(),
            }),
        ),
    }
}

fn classify_clean_stop(report: &TerminationReport<'_>, probe: &dyn OutputProbe) -> TerminationOutcome {
    let path = report.output_path;

    let Some(size) = probe.size_of(path) else {
        return TerminationOutcome::error(
            TerminationReason::EmptyOrMissingOutput,
            failure_message(report, || {
                format!("Recording stopped, but the file was not created: {}", path.display())
            }),
        );
    };

    tracing::info!("Recording saved to {:?} ({} bytes)", path, size);

    if size >= MIN_AUDIO_FILE_BYTES {
        return TerminationOutcome::success(path.to_path_buf(), TerminationReason::CleanStop, None);
    }

    if !report.platform.has_native_loopback() && report.platform.is_supported() {
        return TerminationOutcome::warning(
            path.to_path_buf(),
            TerminationReason::CleanStop,
            silent_file_warning(report.platform).to_string(),
        );
    }

    TerminationOutcome::success(
        path.to_path_buf(),
        TerminationReason::CleanStop,
        Some(format!(
            "The recording is very small ({} bytes); the captured audio may be silent or very quiet.",
            size
        )),
    )
}

fn classify_ambiguous_exit(
    report: &TerminationReport<'_>,
    code: i32,
    probe: &dyn OutputProbe,
) -> TerminationOutcome {
    let path = report.output_path;
    tracing::info!("FFmpeg exited with code {}, checking {:?}", code, path);

    match probe.size_of(path) {
        Some(size) if size > MIN_AUDIO_FILE_BYTES => {
            TerminationOutcome::success(path.to_path_buf(), TerminationReason::AmbiguousExit, None)
        }
        Some(size) if size > 0 => {
            tracing::warn!("Recording file is only {} bytes, probably just a header", size);
            TerminationOutcome::warning(
                path.to_path_buf(),
                TerminationReason::AmbiguousExit,
                silent_file_warning(report.platform).to_string(),
            )
        }
        Some(_) => TerminationOutcome::error(
            TerminationReason::EmptyOrMissingOutput,
            "Recording was interrupted. The file was created but is empty.".to_string(),
        ),
        None => TerminationOutcome::error(
            TerminationReason::EmptyOrMissingOutput,
            failure_message(report, || {
                format!("Recording failed (code {}). The file was not created.", code)
            }),
        ),
    }
}

/// Platform instructions when the diagnostics name a known cause, else the fallback
fn failure_message(report: &TerminationReport<'_>, fallback: impl FnOnce() -> String) -> String {
    match match_failure_signature(report.platform, report.diagnostics) {
        Some(signature) => signature.message.to_string(),
        None => fallback(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::state::OutcomeKind;
    use std::path::PathBuf;

    struct FixedSize(Option<u64>);

    impl OutputProbe for FixedSize {
        fn size_of(&self, _path: &Path) -> Option<u64> {
            self.0
        }
    }

    fn report<'a>(
        exit_code: Option<i32>,
        signal: Option<i32>,
        path: &'a Path,
        platform: &'a CapturePlatform,
    ) -> TerminationReport<'a> {
        TerminationReport {
            exit_code,
            signal,
            output_path: path,
            platform,
            diagnostics: "",
            live_failure: None,
        }
    }

    fn platforms() -> Vec<CapturePlatform> {
        vec![CapturePlatform::Windows, CapturePlatform::MacOs]
    }

    #[test]
    fn test_clean_exit_with_large_file_is_success_everywhere() {
        let path = PathBuf::from("/tmp/out.mp3");
        for platform in platforms() {
            let outcome = classify(&report(Some(0), None, &path, &platform), &FixedSize(Some(1024)));
            assert_eq!(outcome.kind, OutcomeKind::Success);
            assert_eq!(outcome.output_path, Some(path.clone()));
        }
    }

    #[test]
    fn test_small_file_warns_only_without_native_loopback() {
        let path = PathBuf::from("/tmp/out.mp3");

        let mac = CapturePlatform::MacOs;
        let outcome = classify(&report(Some(0), None, &path, &mac), &FixedSize(Some(200)));
        assert_eq!(outcome.kind, OutcomeKind::Warning);
        assert!(outcome.message.unwrap().contains("BlackHole"));

        let windows = CapturePlatform::Windows;
        let outcome = classify(&report(Some(0), None, &path, &windows), &FixedSize(Some(200)));
        assert_eq!(outcome.kind, OutcomeKind::Success);
        assert!(outcome.message.unwrap().contains("very small"));
    }

    #[test]
    fn test_interrupt_counts_as_clean_stop() {
        let path = PathBuf::from("/tmp/out.mp3");
        let platform = CapturePlatform::MacOs;

        let by_code = classify(&report(Some(130), None, &path, &platform), &FixedSize(Some(4096)));
        assert_eq!(by_code.kind, OutcomeKind::Success);

        let by_signal = classify(
            &report(None, Some(SIGNAL_INTERRUPT), &path, &platform),
            &FixedSize(Some(4096)),
        );
        assert_eq!(by_signal.kind, OutcomeKind::Success);
        assert_eq!(by_signal.reason, TerminationReason::CleanStop);
    }

    #[test]
    fn test_clean_stop_without_file_is_error() {
        let path = PathBuf::from("/tmp/missing.mp3");
        let platform = CapturePlatform::Windows;
        let outcome = classify(&report(Some(0), None, &path, &platform), &FixedSize(None));
        assert_eq!(outcome.kind, OutcomeKind::Error);
        assert_eq!(outcome.reason, TerminationReason::EmptyOrMissingOutput);
        assert!(outcome.message.unwrap().contains("not created"));
    }

    #[test]
    fn test_ambiguous_exit_resolved_by_file_size() {
        let path = PathBuf::from("/tmp/out.mp3");
        for platform in platforms() {
            let empty = classify(&report(Some(255), None, &path, &platform), &FixedSize(Some(0)));
            assert_eq!(empty.kind, OutcomeKind::Error);
            assert!(empty.message.unwrap().contains("empty"));

            let full = classify(&report(Some(255), None, &path, &platform), &FixedSize(Some(2048)));
            assert_eq!(full.kind, OutcomeKind::Success);
            assert_eq!(full.reason, TerminationReason::AmbiguousExit);

            let header = classify(&report(Some(1), None, &path, &platform), &FixedSize(Some(1024)));
            assert_eq!(header.kind, OutcomeKind::Warning);

            let missing = classify(&report(Some(1), None, &path, &platform), &FixedSize(None));
            assert_eq!(missing.kind, OutcomeKind::Error);
        }
    }

    #[test]
    fn test_other_exit_codes_are_errors() {
        let path = PathBuf::from("/tmp/out.mp3");
        let platform = CapturePlatform::Windows;
        let outcome = classify(&report(Some(69), None, &path, &platform), &FixedSize(Some(9000)));
        assert_eq!(outcome.kind, OutcomeKind::Error);
        assert!(outcome.message.unwrap().contains("code 69"));
    }

    #[test]
    fn test_error_message_uses_known_signature() {
        let path = PathBuf::from("/tmp/out.mp3");
        let platform = CapturePlatform::Windows;
        let mut failed = report(Some(1), None, &path, &platform);
        failed.exit_code = Some(8);
        failed.diagnostics = "Unknown input format: 'wasapi'\n";

        let outcome = classify(&failed, &FixedSize(None));
        assert!(outcome.message.unwrap().contains("does not support WASAPI"));
    }

    #[test]
    fn test_live_failure_overrides_clean_exit() {
        let path = PathBuf::from("/tmp/out.mp3");
        let platform = CapturePlatform::MacOs;
        let mut killed = report(Some(0), None, &path, &platform);
        killed.live_failure = Some(MACOS_LOOPBACK_DRIVER_HINT);

        let outcome = classify(&killed, &FixedSize(Some(100_000)));
        assert_eq!(outcome.kind, OutcomeKind::Error);
        assert_eq!(outcome.reason, TerminationReason::LiveDiagnosticFailure);
        assert!(outcome.output_path.is_none());
    }

    #[test]
    fn test_signatures_are_platform_specific() {
        assert!(match_failure_signature(&CapturePlatform::MacOs, "Cannot find device").is_none());
        assert!(match_failure_signature(&CapturePlatform::Windows, "Cannot find device").is_some());
        assert!(
            match_failure_signature(&CapturePlatform::Windows, "No AV capture device found")
                .is_none()
        );
    }

    #[test]
    fn test_scanner_finds_signature_split_across_chunks() {
        let mut scanner = DiagnosticScanner::new(CapturePlatform::MacOs);
        assert!(scanner.feed("[avfoundation] No AV capt").is_none());
        let found = scanner.feed("ure device found\n").unwrap();
        assert_eq!(found.pattern, "No AV capture device found");
        assert!(scanner.captured().contains("No AV capture device found"));
    }

    #[test]
    fn test_scanner_keeps_rolling_tail() {
        let mut scanner = DiagnosticScanner::new(CapturePlatform::Windows);
        let chunk = "size=     512kB time=00:00:30.00 bitrate= 128.0kbits/s\r".repeat(1000);
        assert!(scanner.feed(&chunk).is_none());
        assert!(scanner.captured().len() <= CAPTURED_DIAGNOSTICS_LIMIT);
    }

    #[test]
    fn test_tail_respects_char_boundaries() {
        assert_eq!(tail("ab€", 2), "");
        assert_eq!(tail("ab€", 3), "€");
        assert_eq!(tail("abc", 10), "abc");
    }
}
