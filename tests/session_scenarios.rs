use beatline::game::chart;
use beatline::game::combo::ComboSegment;
use beatline::game::gameplay::{GameSession, SessionOptions, TickEvent};
use beatline::game::judgment::{JudgeGrade, ScoreTable};
use beatline::game::note::{LANE_COUNT, Note, NoteId};
use beatline::game::note_source::NoteSource;
use proptest::prelude::*;

fn session(notes: Vec<Note>) -> GameSession {
    GameSession::new(
        SessionOptions {
            music_id: "scenario".into(),
            ..SessionOptions::default()
        },
        NoteSource::from_chart(notes, 600, 150),
    )
}

#[test]
fn perfect_tap_at_1015() {
    let mut s = session(vec![Note::tap("n", 1000, 0)]);
    s.advance(1000);
    s.queue_input_edge(0, true, 1015);
    let report = s.advance(1016);

    let judged = report
        .events
        .iter()
        .find_map(|e| match e {
            TickEvent::Judged(j) => Some(j.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(judged.grade, JudgeGrade::Perfect);
    assert_eq!(judged.offset_ms, -15);

    let r = s.result();
    assert_eq!(r.score, u64::from(ScoreTable::default().perfect));
    assert_eq!(r.perfect, 1);
    assert_eq!(
        r.combo_segments,
        vec![ComboSegment { start_ms: 1015, last_hit_ms: 1015, count: 1 }]
    );
    assert_eq!(r.late_count, 1);
    assert!(report.completed);
}

#[test]
fn untouched_tap_is_swept_one_ms_after_window() {
    let mut s = session(vec![Note::tap("n", 1000, 0)]);
    s.advance(1000);
    let report = s.advance(1150);
    assert!(report.events.is_empty());
    assert_eq!(s.live_notes().len(), 1);

    let report = s.advance(1151);
    assert!(report.events.iter().any(|e| matches!(e, TickEvent::SweepMiss(_))));
    let r = s.result();
    assert_eq!(r.miss, 1);
    assert_eq!(r.current_combo, 0);
    assert_eq!(r.early_count + r.late_count, 0);
    assert!(s.live_notes().is_empty());
}

#[test]
fn hold_held_through_tail_completes_at_2800() {
    let mut s = session(vec![Note::hold("h", 2000, 2, 800)]);
    s.advance(2000);
    s.queue_input_edge(2, true, 2010);
    s.advance(2010);
    assert!(s.holds_snapshot()[2].is_some());

    let mut t = 2010;
    while t < 2784 {
        t += 16;
        let report = s.advance(t);
        assert!(!report.events.iter().any(|e| matches!(e, TickEvent::HoldCompleted { .. })));
    }
    let report = s.advance(2800);
    assert!(
        report
            .events
            .iter()
            .any(|e| matches!(e, TickEvent::HoldCompleted { at_ms: 2800, .. }))
    );
    let r = s.result();
    assert_eq!(r.perfect, 2);
    assert_eq!(r.miss, 0);
    assert!(r.is_full_combo);
    assert!(s.is_complete());
}

#[test]
fn hold_released_at_2500_fails_then() {
    let mut s = session(vec![Note::hold("h", 2000, 2, 800)]);
    s.advance(2000);
    s.queue_input_edge(2, true, 2010);
    s.advance(2010);
    s.queue_input_edge(2, false, 2500);
    let report = s.advance(2500);
    assert!(
        report
            .events
            .iter()
            .any(|e| matches!(e, TickEvent::HoldFailed { at_ms: 2500, .. }))
    );
    let r = s.result();
    assert_eq!(r.miss, 1);
    assert_eq!(r.perfect, 1);
    assert_eq!(r.current_combo, 0);

    // Nothing more happens at the tail.
    let report = s.advance(2800);
    assert!(!report.events.iter().any(|e| matches!(e, TickEvent::HoldFailed { .. })));
    assert_eq!(s.result().miss, 1);
}

#[test]
fn equidistant_press_takes_earliest_note() {
    let mut s = session(vec![Note::tap("n1", 1000, 0), Note::tap("n2", 1040, 0)]);
    s.advance(1000);
    let j = s.judge_press(0, 1020).unwrap();
    assert_eq!(j.note_id, NoteId::from("n1"));
    assert_eq!(j.grade, JudgeGrade::Perfect);
    assert_eq!(s.live_notes()[0].id, NoteId::from("n2"));
}

#[test]
fn completed_session_ignores_further_input() {
    let mut s = session(vec![Note::tap("n", 1000, 0)]);
    s.advance(1000);
    s.queue_input_edge(0, true, 1000);
    assert!(s.advance(1000).completed);
    let frozen = s.result();
    s.queue_input_edge(0, false, 1100);
    assert!(s.judge_press(0, 1100).is_none());
    assert!(s.advance(5000).events.is_empty());
    assert_eq!(s.result(), frozen);
}

#[test]
fn sweep_runs_before_late_arriving_press() {
    let mut s = session(vec![Note::tap("n", 1000, 0)]);
    s.advance(1000);
    // Stamped inside the window, but only delivered after the deadline.
    s.queue_input_edge(0, true, 1100);
    let report = s.advance(1200);

    assert!(report.events.iter().any(|e| matches!(e, TickEvent::SweepMiss(_))));
    assert!(!report.events.iter().any(|e| matches!(e, TickEvent::Judged(_))));
    assert!(s.judgments().is_empty());
    let r = s.result();
    assert_eq!((r.perfect, r.great, r.good, r.miss), (0, 0, 0, 1));
    assert_eq!(r.early_count + r.late_count, 0);
    assert_eq!(r.total_resolved, 1);
    assert!(s.is_lane_down(0));
}

#[test]
fn repeated_chart_ids_judge_the_pressed_lane() {
    let chart = chart::parse_chart(
        r#"{"musicId":"dup","notes":[{"id":"x","time":1000,"lane":0},{"id":"x","time":1000,"lane":2}]}"#,
    )
    .unwrap();
    let mut s = GameSession::from_chart(SessionOptions::default(), chart);
    s.queue_input_edge(2, true, 1000);
    let report = s.advance(1000);

    let judged: Vec<_> = report
        .events
        .iter()
        .filter_map(|e| match e {
            TickEvent::Judged(j) => Some(j.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(judged.len(), 1);
    assert_eq!(judged[0].lane, 2);
    assert_eq!(judged[0].note_id, NoteId::from("x~2"));
    let live_lanes: Vec<usize> = s.live_notes().iter().map(|n| n.lane).collect();
    assert_eq!(live_lanes, [0]);

    s.advance(1151);
    let r = s.result();
    assert_eq!((r.perfect, r.miss), (1, 1));
    assert_eq!(r.total_resolved, 2);
    assert!(s.ledger().is_resolved(&NoteId::from("x")));
    assert!(s.is_complete());
}

#[test]
fn endless_hold_does_not_overflow_the_clock() {
    let mut s = session(vec![Note::hold("h", 1000, 0, i64::MAX)]);
    s.advance(900);
    s.queue_input_edge(0, true, 1000);
    s.advance(1000);
    s.queue_input_edge(0, false, 5000);
    let report = s.advance(5000);
    assert!(
        report
            .events
            .iter()
            .any(|e| matches!(e, TickEvent::HoldFailed { at_ms: 5000, .. }))
    );
    assert!(s.is_complete());
}

fn note_strategy() -> impl Strategy<Value = (i64, usize, Option<i64>)> {
    (
        0i64..4000,
        0usize..LANE_COUNT,
        prop::option::weighted(0.3, 50i64..1500),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn every_note_resolves_exactly_once(
        raw_notes in prop::collection::vec(note_strategy(), 1..40),
        raw_edges in prop::collection::vec((0i64..6000, 0usize..LANE_COUNT, any::<bool>()), 0..120),
    ) {
        let notes: Vec<Note> = raw_notes
            .iter()
            .enumerate()
            .map(|(i, &(time, lane, hold))| match hold {
                Some(d) => Note::hold(format!("n{i}"), time, lane, d),
                None => Note::tap(format!("n{i}"), time, lane),
            })
            .collect();
        let total = notes.len();
        let mut edges = raw_edges;
        edges.sort_by_key(|e| e.0);

        let mut s = session(notes);
        let mut cursor = 0;
        let mut now = 0;
        while !s.is_complete() && now < 20_000 {
            now += 16;
            while cursor < edges.len() && edges[cursor].0 <= now {
                let (at, lane, pressed) = edges[cursor];
                s.queue_input_edge(lane, pressed, at);
                cursor += 1;
            }
            s.advance(now);
        }

        prop_assert!(s.is_complete());
        let r = s.result();
        prop_assert_eq!(r.total_resolved as usize, total);
        prop_assert_eq!(s.ledger().resolved_count(), total);
        for i in 0..total {
            let id = NoteId::from(format!("n{i}"));
            prop_assert!(s.ledger().is_resolved(&id));
        }
        prop_assert!(s.live_notes().is_empty());
        prop_assert!(s.holds_snapshot().iter().all(Option::is_none));
    }
}
