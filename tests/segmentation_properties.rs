//! End-to-end properties of the segmentation and routing pipeline, driven
//! through the mode controller exactly as the real-time callback drives it.

use anyhow::Result;
use micgate::{
    ChannelItem, DetectParams, Frame, ListenParams, MemorySink, Microphone, MockFrameSource, Mode,
    ModeController, ScriptedClassifier, ScriptedSpotter, SessionKind,
};
use std::time::Duration;

const FRAME_MS: u32 = 30;
const SAMPLES_PER_FRAME: usize = 480;

fn frame(seq: u64) -> Frame {
    Frame::new(seq, vec![0i16; SAMPLES_PER_FRAME])
}

fn receive_timeout() -> Duration {
    Duration::from_millis(200)
}

fn listen_params(max_phrase_ms: u64, max_wait_ms: u64) -> ListenParams {
    ListenParams::new(max_phrase_ms, max_wait_ms).with_receive_timeout(receive_timeout())
}

#[test]
fn test_preroll_equals_frames_pushed_before_activation() -> Result<()> {
    let (mut controller, handle) = ModeController::new();

    // Activation lands on the 8th frame; all 8 pushed frames come back as
    // pre-roll; no duplication, no loss.
    let mut flags = vec![false, false, false, true, true, true, true, true];
    flags.extend(std::iter::repeat_n(false, 48));
    let classifier = Box::new(ScriptedClassifier::new(&flags, false));
    let mut session = handle.arm_listen(&listen_params(60_000, 60_000), classifier, FRAME_MS)?;

    for seq in 0..56 {
        controller.on_frame(frame(seq));
    }

    let segment = session.next_segment()?.expect("one segment");
    let sequences: Vec<u64> = segment.frames.iter().map(|f| f.sequence).collect();
    assert_eq!(&sequences[..8], &[0, 1, 2, 3, 4, 5, 6, 7], "pre-roll in capture order");
    assert_eq!(sequences.len(), 56);
    Ok(())
}

#[test]
fn test_three_voiced_of_eight_never_activates() -> Result<()> {
    let (mut controller, handle) = ModeController::new();

    // 3 voiced frames in the 8-frame window stay below the threshold of 4.
    let flags = [false, false, false, false, true, true, true, false];
    let classifier = Box::new(ScriptedClassifier::new(&flags, false));
    let mut session = handle.arm_listen(&listen_params(60_000, 60_000), classifier, FRAME_MS)?;

    for seq in 0..8 {
        controller.on_frame(frame(seq));
    }

    assert!(controller.is_armed(Mode::Listening), "still waiting for speech");

    // Cancel; the only thing the session ever yields is its terminal.
    session.stop();
    controller.on_frame(frame(8));
    assert_eq!(session.next_segment()?, None);
    Ok(())
}

#[test]
fn test_sustained_silence_in_exit_window_forces_ending() -> Result<()> {
    let (mut controller, handle) = ModeController::new();

    // After activation, stay below the exit threshold of 2 voiced frames so
    // the segment ends when the exit window fills.
    let mut flags = vec![true; 8];
    flags.extend(std::iter::repeat_n(false, 48));
    flags.extend(std::iter::repeat_n(true, 20)); // never reached
    let classifier = Box::new(ScriptedClassifier::new(&flags, false));
    let mut session = handle.arm_listen(&listen_params(60_000, 60_000), classifier, FRAME_MS)?;

    for seq in 0..76 {
        controller.on_frame(frame(seq));
    }

    let segment = session.next_segment()?.expect("one segment");
    // 8 pre-roll + 48 exit-window frames; the trailing voiced frames came
    // after the cut and belong to no segment.
    assert_eq!(segment.len(), 56);
    assert_eq!(session.next_segment()?, None, "single-shot session ended");
    Ok(())
}

#[test]
fn test_max_phrase_cuts_at_exactly_frame_300_of_active() -> Result<()> {
    let (mut controller, handle) = ModeController::new();

    // 9000ms at 30ms frames = 300 Active frames, despite continued speech.
    let classifier = Box::new(ScriptedClassifier::new(&[], true)); // always voiced
    let mut session = handle.arm_listen(&listen_params(9000, 60_000), classifier, FRAME_MS)?;

    for seq in 0..400 {
        controller.on_frame(frame(seq));
    }

    let segment = session.next_segment()?.expect("one segment");
    // Activation on frame 7 (the 8th) is Active frame 1; Active frame 300 is
    // capture frame 306.
    assert_eq!(segment.frames.first().map(|f| f.sequence), Some(0));
    assert_eq!(segment.frames.last().map(|f| f.sequence), Some(306));
    assert_eq!(segment.len(), 307);
    Ok(())
}

#[test]
fn test_max_wait_yields_empty_terminal_at_frame_133() -> Result<()> {
    let (mut controller, handle) = ModeController::new();

    // 4000ms at 30ms frames floors to 133 frames.
    let classifier = Box::new(ScriptedClassifier::new(&[], false)); // never voiced
    let mut session = handle.arm_listen(&listen_params(9000, 4000), classifier, FRAME_MS)?;

    for seq in 0..132 {
        controller.on_frame(frame(seq));
    }
    assert!(controller.is_armed(Mode::Listening), "132 frames are not enough");

    controller.on_frame(frame(132));
    assert!(!controller.is_armed(Mode::Listening), "the 133rd frame expires the wait");

    assert_eq!(session.next_segment()?, None, "no segment content at all");
    Ok(())
}

#[test]
fn test_rearmed_session_never_sees_older_frames() -> Result<()> {
    let (mut controller, handle) = ModeController::new();

    // First session accumulates voiced pre-roll but is disarmed before
    // activating.
    let classifier = Box::new(ScriptedClassifier::new(&[true; 7], false));
    let mut first = handle.arm_listen(&listen_params(60_000, 60_000), classifier, FRAME_MS)?;
    for seq in 0..7 {
        controller.on_frame(frame(seq));
    }
    handle.disarm(Mode::Listening)?;
    controller.on_frame(frame(7));
    assert_eq!(first.next_segment()?, None);

    // Second arm: a fresh ring. Its first segment's pre-roll contains only
    // frames captured after the second arm call.
    let mut flags = vec![true; 8];
    flags.extend(std::iter::repeat_n(false, 48));
    let classifier = Box::new(ScriptedClassifier::new(&flags, false));
    let mut second = handle.arm_listen(&listen_params(60_000, 60_000), classifier, FRAME_MS)?;
    for seq in 1000..1056 {
        controller.on_frame(frame(seq));
    }

    let segment = second.next_segment()?.expect("one segment");
    assert!(
        segment.frames.iter().all(|f| f.sequence >= 1000),
        "no cross-session leakage"
    );
    Ok(())
}

#[test]
fn test_disarming_recording_closes_sink_once_and_preserves_listen_boundaries() -> Result<()> {
    let (mut controller, handle) = ModeController::new();

    // Listening: activates on frame 7, ends by silence on frame 63.
    let mut flags = vec![true; 8];
    flags.extend(std::iter::repeat_n(false, 48));
    let classifier = Box::new(ScriptedClassifier::new(&flags, false));
    let mut session = handle.arm_listen(&listen_params(60_000, 60_000), classifier, FRAME_MS)?;

    let sink = MemorySink::new();
    let sink_state = sink.state();
    let recording = handle.arm_record(Box::new(sink), 60_000, FRAME_MS)?;

    for seq in 0..20 {
        controller.on_frame(frame(seq));
    }

    // Disarm recording mid-session.
    handle.disarm(Mode::Recording)?;
    for seq in 20..56 {
        controller.on_frame(frame(seq));
    }

    recording.wait()?;
    assert_eq!(sink_state.close_count(), 1, "sink closed exactly once");
    assert_eq!(
        sink_state.samples().len(),
        20 * SAMPLES_PER_FRAME,
        "recording stopped at the disarm boundary"
    );

    // The listening session's segment boundary is exactly where it would
    // have been without the recording mode.
    let segment = session.next_segment()?.expect("one segment");
    assert_eq!(segment.len(), 56);
    assert_eq!(segment.frames.last().map(|f| f.sequence), Some(55));
    Ok(())
}

#[test]
fn test_continuous_session_yields_multiple_segments_in_order() -> Result<()> {
    let (mut controller, handle) = ModeController::new();

    let mut flags = Vec::new();
    for _ in 0..3 {
        flags.extend(std::iter::repeat_n(true, 8));
        flags.extend(std::iter::repeat_n(false, 48));
    }
    let classifier = Box::new(ScriptedClassifier::new(&flags, false));
    let params = listen_params(60_000, 60_000).with_kind(SessionKind::Continuous);
    let mut session = handle.arm_listen(&params, classifier, FRAME_MS)?;

    for seq in 0..(3 * 56) {
        controller.on_frame(frame(seq));
    }

    for n in 0..3u64 {
        let segment = session.next_segment()?.expect("segment");
        assert_eq!(segment.len(), 56);
        assert_eq!(segment.frames[0].sequence, n * 56);
    }

    session.stop();
    controller.on_frame(frame(999));
    assert_eq!(session.next_segment()?, None);
    Ok(())
}

#[test]
fn test_detection_and_listening_share_one_frame_stream() -> Result<()> {
    let (mut controller, handle) = ModeController::new();

    let spotter = ScriptedSpotter::new().with_hypothesis_after(5, "ok micgate");
    let detect_params = DetectParams::new("micgate").with_receive_timeout(receive_timeout());
    let mut detect = handle.arm_detect(&detect_params, Box::new(spotter))?;

    let mut flags = vec![true; 8];
    flags.extend(std::iter::repeat_n(false, 48));
    let classifier = Box::new(ScriptedClassifier::new(&flags, false));
    let mut listen = handle.arm_listen(&listen_params(60_000, 60_000), classifier, FRAME_MS)?;

    for seq in 0..60 {
        controller.on_frame(frame(seq));
    }

    assert_eq!(detect.wait_for_keyword()?, Some("ok micgate".to_string()));
    let segment = listen.next_segment()?.expect("one segment");
    assert_eq!(segment.len(), 56);
    Ok(())
}

#[test]
fn test_listen_over_mock_source_delivers_one_segment() -> Result<()> {
    let source = MockFrameSource::new().with_batches(vec![vec![0i16; SAMPLES_PER_FRAME]; 60]);
    let mut mic = Microphone::new(Box::new(source))?;

    let mut flags = vec![true; 8];
    flags.extend(std::iter::repeat_n(false, 48));
    let classifier = Box::new(ScriptedClassifier::new(&flags, false));
    let mut listen = mic.start_listening_with(&listen_params(60_000, 60_000), classifier)?;

    let segment = listen.next_segment()?.expect("one segment");
    assert_eq!(segment.len(), 56);
    assert_eq!(listen.next_segment()?, None);
    Ok(())
}

#[test]
fn test_terminal_marker_is_always_the_last_item() -> Result<()> {
    // Observed at the channel level: after the terminal, nothing follows.
    let (mut tx, rx) = micgate::frame_channel(4);
    tx.send(ChannelItem::frame(frame(0), true));
    tx.send(ChannelItem::EndOfStream);
    drop(tx);

    let mut saw_terminal = false;
    loop {
        match rx.recv_timeout(receive_timeout()) {
            micgate::Received::Item(ChannelItem::Frame { .. }) => {
                assert!(!saw_terminal, "no frame after the terminal marker");
            }
            micgate::Received::Item(ChannelItem::EndOfStream) => {
                saw_terminal = true;
            }
            micgate::Received::Disconnected => break,
            micgate::Received::TimedOut => panic!("producer stalled"),
        }
    }
    assert!(saw_terminal);
    Ok(())
}
