use std::sync::atomic::Ordering;
use std::time::Duration;

use skillvault_api::{
    engine::{BrowserEvent, Directive, EngineError, ProctoringPolicy, WarningSeverity},
    models::{timer::TimerEvent, EnrollmentStatus, SessionStatus, SubmitReason},
    services::session_service::{SessionError, SessionService},
};
use tokio_test::{assert_err, assert_ok};

mod common;

use common::{
    assessment_request, mcq, question_set, session_service, skill_request, ten_questions, Fakes,
};

fn windowed_policy() -> ProctoringPolicy {
    let mut policy = ProctoringPolicy::default();
    policy.fullscreen_required = false;
    policy
}

/// Answers the first `correct` questions with "A" and the rest with "B".
async fn answer(service: &SessionService, session_id: &str, count: usize, correct: usize) {
    for index in 0..count {
        let value = if index < correct { "A" } else { "B" };
        assert_ok!(
            service
                .record_answer(session_id, index, value.to_string())
                .await
        );
    }
}

#[tokio::test]
async fn test_manual_submit_scores_and_persists_once() {
    let fakes = Fakes::new(question_set(ten_questions(), 600));
    let service = session_service(&fakes, windowed_policy());

    let started = assert_ok!(service.start(assessment_request("stu-1", "a-1")).await);
    assert!(!started.resumed);
    assert_eq!(started.attempt_id, "attempt-1");
    assert_eq!(started.questions.len(), 10);
    assert_eq!(started.session.status, SessionStatus::Active);
    assert!(started.directives.is_empty());

    answer(&service, &started.session_id, 10, 8).await;

    let submitted = assert_ok!(service.submit(&started.session_id).await);
    let result = submitted.result.expect("submit returns the result");
    assert_eq!(result.status, SessionStatus::Completed);
    assert_eq!(result.reason, SubmitReason::Manual);
    assert_eq!(result.score, 80);
    assert_eq!(result.total_marks, 100);
    assert_eq!(result.percentage, 80);
    assert!(result.passed);
    assert_eq!(result.certificate_id.as_deref(), Some("CERT-TEST-1"));
    assert!(submitted
        .directives
        .iter()
        .any(|d| matches!(d, Directive::ExitFullscreen)));

    assert_eq!(fakes.attempts.update_count(), 1);
    assert_eq!(fakes.certificates.issued_count(), 1);
    assert_eq!(
        *fakes.attempts.certificate_links.lock().unwrap(),
        vec![("attempt-1".to_string(), "CERT-TEST-1".to_string())]
    );

    // The session is gone from the registry; a second submit cannot re-score it
    let again = service.submit(&started.session_id).await;
    assert!(matches!(again, Err(SessionError::NotFound(_))));
    assert_eq!(fakes.attempts.update_count(), 1);

    let cached = assert_ok!(service.result(&started.session_id).await);
    assert_eq!(cached, result);
}

#[tokio::test]
async fn test_certificate_threshold_is_inclusive() {
    for (earned, expect_pass) in [(69u32, false), (70u32, true)] {
        let questions = vec![mcq("q0", 0, earned), mcq("q1", 0, 100 - earned)];
        let fakes = Fakes::new(question_set(questions, 600));
        let service = session_service(&fakes, windowed_policy());

        let started = assert_ok!(service.start(assessment_request("stu-1", "a-1")).await);
        answer(&service, &started.session_id, 2, 1).await;

        let result = assert_ok!(service.submit(&started.session_id).await)
            .result
            .expect("result");
        assert_eq!(result.percentage, earned);
        assert_eq!(result.passed, expect_pass);
        assert_eq!(result.certificate_id.is_some(), expect_pass);
        assert_eq!(fakes.certificates.issued_count(), usize::from(expect_pass));
    }
}

#[tokio::test]
async fn test_certificate_request_carries_assessment_details() {
    let fakes = Fakes::new(question_set(ten_questions(), 600));
    let service = session_service(&fakes, windowed_policy());

    let started = assert_ok!(service.start(assessment_request("stu-7", "a-42")).await);
    answer(&service, &started.session_id, 10, 10).await;
    assert_ok!(service.submit(&started.session_id).await);

    let issued = fakes.certificates.issued.lock().unwrap();
    assert_eq!(issued.len(), 1);
    assert_eq!(issued[0].student_id, "stu-7");
    assert_eq!(issued[0].assessment_id, "a-42");
    assert_eq!(issued[0].assessment_title, "Rust Fundamentals");
    assert_eq!(issued[0].percentage, 100);
    assert_eq!(issued[0].passing_grade, 70);
    assert_eq!(issued[0].attempt_id, "attempt-1");
}

#[tokio::test]
async fn test_skill_flow_updates_enrollment() {
    let fakes = Fakes::new(question_set(ten_questions(), 600));
    let service = session_service(&fakes, windowed_policy());

    let passed = assert_ok!(service.start(skill_request("stu-1", "rust")).await);
    answer(&service, &passed.session_id, 10, 9).await;
    assert_ok!(service.submit(&passed.session_id).await);

    let failed = assert_ok!(service.start(skill_request("stu-2", "rust")).await);
    answer(&service, &failed.session_id, 10, 3).await;
    assert_ok!(service.submit(&failed.session_id).await);

    let updates = fakes.enrollments.updates.lock().unwrap();
    assert_eq!(updates.len(), 2);
    assert_eq!(
        updates[0],
        (
            "stu-1".to_string(),
            "rust".to_string(),
            EnrollmentStatus::Certified,
            Some("CERT-TEST-1".to_string())
        )
    );
    assert_eq!(
        updates[1],
        (
            "stu-2".to_string(),
            "rust".to_string(),
            EnrollmentStatus::Completed,
            None
        )
    );
}

#[tokio::test]
async fn test_assessment_flow_leaves_enrollments_alone() {
    let fakes = Fakes::new(question_set(ten_questions(), 600));
    let service = session_service(&fakes, windowed_policy());

    let started = assert_ok!(service.start(assessment_request("stu-1", "a-1")).await);
    assert_ok!(service.submit(&started.session_id).await);

    assert!(fakes.enrollments.updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_start_resumes_live_session() {
    let fakes = Fakes::new(question_set(ten_questions(), 600));
    let service = session_service(&fakes, windowed_policy());

    let first = assert_ok!(service.start(assessment_request("stu-1", "a-1")).await);
    assert_ok!(
        service
            .record_answer(&first.session_id, 0, "A".to_string())
            .await
    );

    let second = assert_ok!(service.start(assessment_request("stu-1", "a-1")).await);
    assert!(second.resumed);
    assert_eq!(second.session_id, first.session_id);
    assert_eq!(second.session.answered_count, 1);
    assert_eq!(fakes.attempts.created.lock().unwrap().len(), 1);

    // A different student gets a separate session
    let other = assert_ok!(service.start(assessment_request("stu-2", "a-1")).await);
    assert_ne!(other.session_id, first.session_id);
    assert_eq!(service.active_session_count().await, 2);
}

#[tokio::test]
async fn test_start_failures_create_no_session() {
    let fakes = Fakes::new(question_set(ten_questions(), 600));
    let service = session_service(&fakes, windowed_policy());

    fakes.attempts.fail_create.store(true, Ordering::SeqCst);
    let err = assert_err!(service.start(assessment_request("stu-1", "a-1")).await);
    assert!(matches!(err, SessionError::Transient(_)));
    assert_eq!(service.active_session_count().await, 0);

    fakes.attempts.fail_create.store(false, Ordering::SeqCst);
    fakes.questions.unavailable.store(true, Ordering::SeqCst);
    let err = assert_err!(service.start(assessment_request("stu-1", "a-1")).await);
    assert!(matches!(err, SessionError::Transient(_)));

    fakes.questions.unavailable.store(false, Ordering::SeqCst);
    *fakes.questions.set.lock().unwrap() = None;
    let err = assert_err!(service.start(assessment_request("stu-1", "a-1")).await);
    assert!(matches!(err, SessionError::NotFound(_)));

    *fakes.questions.set.lock().unwrap() = Some(question_set(Vec::new(), 600));
    let err = assert_err!(service.start(assessment_request("stu-1", "a-1")).await);
    assert!(matches!(err, SessionError::Engine(EngineError::NoQuestions)));

    *fakes.questions.set.lock().unwrap() = Some(question_set(ten_questions(), 0));
    let err = assert_err!(service.start(assessment_request("stu-1", "a-1")).await);
    assert!(matches!(err, SessionError::Engine(EngineError::InvalidDuration)));

    assert!(fakes.attempts.created.lock().unwrap().is_empty());

    // Failed starts leave nothing behind that blocks the next one
    *fakes.questions.set.lock().unwrap() = Some(question_set(ten_questions(), 600));
    let started = assert_ok!(service.start(assessment_request("stu-1", "a-1")).await);
    assert!(!started.resumed);
}

#[tokio::test]
async fn test_failed_save_is_retried_through_persist() {
    let fakes = Fakes::new(question_set(ten_questions(), 600));
    let service = session_service(&fakes, windowed_policy());

    let started = assert_ok!(service.start(assessment_request("stu-1", "a-1")).await);
    answer(&service, &started.session_id, 10, 10).await;

    // Exhausts all three retry attempts
    fakes.attempts.failing_updates.store(3, Ordering::SeqCst);
    let err = assert_err!(service.submit(&started.session_id).await);
    assert!(matches!(err, SessionError::ResultNotSaved(_)));
    assert_eq!(fakes.attempts.update_count(), 0);
    assert_eq!(fakes.certificates.issued_count(), 0);

    // The terminal result is kept and readable while unsaved
    let pending = assert_ok!(service.result(&started.session_id).await);
    assert_eq!(pending.percentage, 100);
    assert_eq!(
        assert_ok!(service.view(&started.session_id).await).status,
        SessionStatus::Completed
    );

    // Signals after the terminal transition are no-ops
    let noop = assert_ok!(service.submit(&started.session_id).await);
    assert!(noop.result.is_none());
    assert!(noop.directives.is_empty());

    assert_eq!(service.pending_save_count().await, 1);

    let saved = assert_ok!(service.persist(&started.session_id).await);
    assert_eq!(saved.certificate_id.as_deref(), Some("CERT-TEST-1"));
    assert_eq!(fakes.attempts.update_count(), 1);
    assert_eq!(fakes.certificates.issued_count(), 1);
    assert_eq!(service.pending_save_count().await, 0);

    let err = assert_err!(service.persist(&started.session_id).await);
    assert!(matches!(err, SessionError::NothingToPersist(_)));
    assert_eq!(fakes.certificates.issued_count(), 1);
}

#[tokio::test]
async fn test_transient_save_failure_is_absorbed_by_retry() {
    let fakes = Fakes::new(question_set(ten_questions(), 600));
    let service = session_service(&fakes, windowed_policy());

    let started = assert_ok!(service.start(assessment_request("stu-1", "a-1")).await);
    fakes.attempts.failing_updates.store(2, Ordering::SeqCst);

    let submitted = assert_ok!(service.submit(&started.session_id).await);
    assert!(submitted.result.is_some());
    assert_eq!(fakes.attempts.update_count(), 1);
}

#[tokio::test]
async fn test_certificate_failure_does_not_fail_submission() {
    let fakes = Fakes::new(question_set(ten_questions(), 600));
    let service = session_service(&fakes, windowed_policy());
    fakes.certificates.fail.store(true, Ordering::SeqCst);

    let started = assert_ok!(service.start(assessment_request("stu-1", "a-1")).await);
    answer(&service, &started.session_id, 10, 10).await;

    let result = assert_ok!(service.submit(&started.session_id).await)
        .result
        .expect("result");
    assert!(result.passed);
    assert!(result.certificate_id.is_none());
    assert_eq!(fakes.attempts.update_count(), 1);
    assert!(fakes.attempts.certificate_links.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_tab_switch_limit_auto_submits() {
    let fakes = Fakes::new(question_set(ten_questions(), 600));
    let service = session_service(&fakes, windowed_policy());

    let started = assert_ok!(service.start(assessment_request("stu-1", "a-1")).await);
    let hidden = || BrowserEvent::VisibilityChanged { hidden: true };

    for expected in 1..=2u32 {
        let response = assert_ok!(service.browser_event(&started.session_id, hidden()).await);
        assert!(response.result.is_none());
        assert_eq!(response.session.tab_switch_count, expected);
        assert!(response.directives.iter().any(|d| matches!(
            d,
            Directive::Warn {
                severity: WarningSeverity::Warning,
                ..
            }
        )));
    }

    // Coming back to the page is not a violation
    let visible = assert_ok!(
        service
            .browser_event(&started.session_id, BrowserEvent::VisibilityChanged { hidden: false })
            .await
    );
    assert_eq!(visible.session.violation_count, 2);

    let third = assert_ok!(service.browser_event(&started.session_id, hidden()).await);
    let result = third.result.expect("limit reached auto-submits");
    assert_eq!(result.status, SessionStatus::AutoSubmitted);
    assert_eq!(result.reason, SubmitReason::Integrity);
    assert_eq!(result.tab_switch_count, 3);
    assert_eq!(result.violations.len(), 3);
    assert!(third.directives.iter().any(|d| matches!(
        d,
        Directive::Warn {
            severity: WarningSeverity::Critical,
            ..
        }
    )));
    assert_eq!(fakes.attempts.update_count(), 1);
}

#[tokio::test]
async fn test_blocked_shortcut_is_suppressed_not_counted() {
    let fakes = Fakes::new(question_set(ten_questions(), 600));
    let service = session_service(&fakes, windowed_policy());
    let started = assert_ok!(service.start(assessment_request("stu-1", "a-1")).await);

    for _ in 0..5 {
        let response = assert_ok!(
            service
                .browser_event(
                    &started.session_id,
                    BrowserEvent::KeyDown {
                        key: "u".to_string(),
                        ctrl: true,
                        shift: false,
                        alt: false,
                        meta: false,
                    },
                )
                .await
        );
        assert!(response.result.is_none());
        assert!(response
            .directives
            .iter()
            .any(|d| matches!(d, Directive::SuppressDefault)));
    }

    let view = assert_ok!(service.view(&started.session_id).await);
    assert_eq!(view.status, SessionStatus::Active);
    assert_eq!(view.violation_count, 5);
}

#[tokio::test]
async fn test_abandon_marks_attempt_without_scoring() {
    let fakes = Fakes::new(question_set(ten_questions(), 600));
    let service = session_service(&fakes, windowed_policy());

    let started = assert_ok!(service.start(assessment_request("stu-1", "a-1")).await);
    let view = assert_ok!(service.abandon(&started.session_id).await);
    assert_eq!(view.status, SessionStatus::Abandoned);

    assert_eq!(
        *fakes.attempts.abandoned.lock().unwrap(),
        vec!["attempt-1".to_string()]
    );
    assert_eq!(fakes.attempts.update_count(), 0);
    assert_eq!(fakes.certificates.issued_count(), 0);

    let err = assert_err!(service.abandon(&started.session_id).await);
    assert!(matches!(err, SessionError::NotFound(_)));

    let restarted = assert_ok!(service.start(assessment_request("stu-1", "a-1")).await);
    assert!(!restarted.resumed);
    assert_ne!(restarted.session_id, started.session_id);
}

#[tokio::test]
async fn test_out_of_range_answer_is_rejected() {
    let fakes = Fakes::new(question_set(ten_questions(), 600));
    let service = session_service(&fakes, windowed_policy());
    let started = assert_ok!(service.start(assessment_request("stu-1", "a-1")).await);

    let err = assert_err!(
        service
            .record_answer(&started.session_id, 10, "A".to_string())
            .await
    );
    assert!(matches!(
        err,
        SessionError::Engine(EngineError::QuestionIndexOutOfRange { index: 10, len: 10 })
    ));

    let err = assert_err!(service.navigate(&started.session_id, 11).await);
    assert!(matches!(
        err,
        SessionError::Engine(EngineError::QuestionIndexOutOfRange { .. })
    ));

    let moved = assert_ok!(service.navigate(&started.session_id, 9).await);
    assert_eq!(moved.session.current_question_index, 9);
}

#[tokio::test]
async fn test_result_before_submit_is_conflict() {
    let fakes = Fakes::new(question_set(ten_questions(), 600));
    let service = session_service(&fakes, windowed_policy());
    let started = assert_ok!(service.start(assessment_request("stu-1", "a-1")).await);

    let err = assert_err!(service.result(&started.session_id).await);
    assert!(matches!(err, SessionError::Conflict(_)));

    let err = assert_err!(service.result("missing").await);
    assert!(matches!(err, SessionError::NotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn test_timer_expiry_auto_submits() {
    let fakes = Fakes::new(question_set(ten_questions(), 3));
    let service = session_service(&fakes, windowed_policy());

    let started = assert_ok!(service.start(assessment_request("stu-1", "a-1")).await);
    let (snapshot, mut events) = assert_ok!(service.subscribe(&started.session_id).await);
    assert_eq!(snapshot.remaining_seconds, 3);
    answer(&service, &started.session_id, 10, 7).await;

    tokio::time::sleep(Duration::from_secs(5)).await;

    let result = assert_ok!(service.result(&started.session_id).await);
    assert_eq!(result.status, SessionStatus::Completed);
    assert_eq!(result.reason, SubmitReason::Timeout);
    assert_eq!(result.time_spent, 3);
    assert_eq!(result.percentage, 70);
    assert_eq!(fakes.attempts.update_count(), 1);

    let mut remaining = Vec::new();
    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let TimerEvent::TimerTick(tick) = &event {
            remaining.push(tick.remaining_seconds);
        }
        names.push(event.event_name());
    }
    assert_eq!(remaining, vec![2, 1, 0]);
    assert_eq!(
        names,
        vec![
            "timer-tick",
            "timer-tick",
            "timer-tick",
            "time-expired",
            "session-finalized"
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_ticker_stops_after_manual_submit() {
    let fakes = Fakes::new(question_set(ten_questions(), 60));
    let service = session_service(&fakes, windowed_policy());

    let started = assert_ok!(service.start(assessment_request("stu-1", "a-1")).await);
    tokio::time::sleep(Duration::from_millis(2500)).await;

    let result = assert_ok!(service.submit(&started.session_id).await)
        .result
        .expect("result");
    assert_eq!(result.time_spent, 2);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(fakes.attempts.update_count(), 1);
    assert_eq!(service.active_session_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_start_does_not_block_the_pair() {
    let fakes = Fakes::new(question_set(ten_questions(), 600));
    let service = session_service(&fakes, windowed_policy());

    // The client goes away while the attempt store hangs
    fakes.attempts.stall_next_create.store(true, Ordering::SeqCst);
    let cancelled = tokio::time::timeout(
        Duration::from_millis(50),
        service.start(assessment_request("stu-1", "a-1")),
    )
    .await;
    assert!(cancelled.is_err());
    assert_eq!(service.active_session_count().await, 0);

    let started = assert_ok!(service.start(assessment_request("stu-1", "a-1")).await);
    assert!(!started.resumed);
    assert_eq!(started.attempt_id, "attempt-1");
    assert_eq!(service.active_session_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_limit_submit_racing_timer_expiry_saves_once() {
    let fakes = Fakes::new(question_set(ten_questions(), 3));
    let service = session_service(&fakes, windowed_policy());
    let started = assert_ok!(service.start(assessment_request("stu-1", "a-1")).await);
    let hidden = || BrowserEvent::VisibilityChanged { hidden: true };

    for _ in 0..2 {
        assert_ok!(service.browser_event(&started.session_id, hidden()).await);
    }

    // The third tab switch lands on the same instant as the last tick
    tokio::time::sleep(Duration::from_millis(2999)).await;
    let (third, _) = tokio::join!(
        async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            service.browser_event(&started.session_id, hidden()).await
        },
        tokio::time::sleep(Duration::from_secs(5)),
    );
    assert!(matches!(third, Ok(_) | Err(SessionError::NotFound(_))));

    assert_eq!(fakes.attempts.update_count(), 1);
    let result = assert_ok!(service.result(&started.session_id).await);
    match result.status {
        SessionStatus::AutoSubmitted => assert_eq!(result.reason, SubmitReason::Integrity),
        SessionStatus::Completed => assert_eq!(result.reason, SubmitReason::Timeout),
        other => panic!("unexpected terminal status {:?}", other),
    }
    assert_eq!(fakes.attempts.updates.lock().unwrap()[0].1, result);
    assert_eq!(service.active_session_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_expired_results_are_pruned_from_the_cache() {
    let fakes = Fakes::new(question_set(ten_questions(), 600));
    let service = session_service(&fakes, windowed_policy());

    for student in ["stu-1", "stu-2", "stu-3"] {
        let started = assert_ok!(service.start(assessment_request(student, "a-1")).await);
        assert_ok!(service.submit(&started.session_id).await);
    }
    assert_eq!(service.cached_result_count().await, 3);

    tokio::time::sleep(Duration::from_secs(61)).await;

    let last = assert_ok!(service.start(assessment_request("stu-4", "a-1")).await);
    assert_ok!(service.submit(&last.session_id).await);
    assert_eq!(service.cached_result_count().await, 1);
    assert_ok!(service.result(&last.session_id).await);
}

#[tokio::test(start_paused = true)]
async fn test_unsaved_session_expires_after_persist_window() {
    let fakes = Fakes::new(question_set(ten_questions(), 600));
    let service = session_service(&fakes, windowed_policy());

    let stuck = assert_ok!(service.start(assessment_request("stu-1", "a-1")).await);
    fakes.attempts.failing_updates.store(1000, Ordering::SeqCst);
    let err = assert_err!(service.submit(&stuck.session_id).await);
    assert!(matches!(err, SessionError::ResultNotSaved(_)));
    assert_eq!(service.pending_save_count().await, 1);

    tokio::time::sleep(Duration::from_secs(121)).await;
    fakes.attempts.failing_updates.store(0, Ordering::SeqCst);

    assert_ok!(service.start(assessment_request("stu-2", "a-1")).await);
    assert_eq!(service.pending_save_count().await, 0);

    let err = assert_err!(service.persist(&stuck.session_id).await);
    assert!(matches!(err, SessionError::NotFound(_)));
    assert_eq!(fakes.attempts.update_count(), 0);
}

#[tokio::test]
async fn test_explanation_is_withheld_until_submission() {
    let mut questions = ten_questions();
    questions[0].explanation = Some("Only A owns its buffer".to_string());
    let fakes = Fakes::new(question_set(questions, 600));
    let service = session_service(&fakes, windowed_policy());

    let started = assert_ok!(service.start(assessment_request("stu-1", "a-1")).await);
    let sent = serde_json::to_string(&started.questions).unwrap();
    assert!(!sent.contains("owns its buffer"));

    let resumed = assert_ok!(service.start(assessment_request("stu-1", "a-1")).await);
    let sent = serde_json::to_string(&resumed.questions).unwrap();
    assert!(!sent.contains("owns its buffer"));

    answer(&service, &started.session_id, 1, 1).await;
    let result = assert_ok!(service.submit(&started.session_id).await)
        .result
        .expect("result");
    assert_eq!(
        result.answers[0].explanation.as_deref(),
        Some("Only A owns its buffer")
    );
    assert_eq!(result.answers[1].explanation, None);
}
