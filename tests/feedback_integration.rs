// Integration tests for the clinician feedback loop

use anesthesia_rl::console::{Console, InputError};
use anesthesia_rl::feedback::{run_interactive, FeedbackConfig, FeedbackLog, FeedbackSession};
use anesthesia_rl::rl::{
    AnesthesiaEnv, AnesthesiaEnvConfig, Policy, PpoConfig, PpoPolicy, TargetDoses,
};
use std::io::Cursor;
use std::path::Path;
use tempfile::TempDir;

fn trained_session(audit: &Path) -> FeedbackSession<PpoPolicy> {
    let mut env = AnesthesiaEnv::new(AnesthesiaEnvConfig {
        seed: Some(21),
        ..AnesthesiaEnvConfig::default()
    });
    let cfg = PpoConfig {
        n_steps: 64,
        batch_size: 32,
        n_epochs: 2,
        seed: Some(21),
        ..PpoConfig::default_quick()
    };
    let mut policy = PpoPolicy::for_env(&env, cfg).unwrap();
    policy.learn(&mut env, 64, false).unwrap();

    FeedbackSession::new(
        env,
        policy,
        FeedbackConfig {
            fine_tune_steps: 64,
            audit_path: Some(audit.to_path_buf()),
        },
    )
    .unwrap()
}

fn scripted(input: &str) -> Console<Cursor<Vec<u8>>, Vec<u8>> {
    Console::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
}

#[test]
fn test_scripted_session_with_one_correction() {
    let dir = TempDir::new().unwrap();
    let audit = dir.path().join("audit/feedback.jsonl");
    let mut session = trained_session(&audit);

    // Patient 1 rejected with corrected rates, patient 2 approved, then stop
    let mut console = scripted("70\n2\n40\nno\n2.5\n7\nyes\n80\n3\n70\nyes\nno\n");
    let consultations = run_interactive(&mut session, &mut console).unwrap();
    assert_eq!(consultations, 2);

    assert!(session.fine_tuned());
    assert_eq!(session.env().target(), TargetDoses::new(2.5, 7.0));
    assert_eq!(session.corrections().len(), 1);
    assert!(session.env().pinned_patient().is_none());

    let (_, output) = console.into_inner();
    let output = String::from_utf8(output).unwrap();
    assert_eq!(output.matches("Proposed induction dose rate:").count(), 2);
    assert_eq!(output.matches("Policy updated with clinician feedback.").count(), 1);
    assert!(output.contains("Correct induction dose rate: 2.50 mg/kg"));
    assert!(output.contains("Final initial dose: 175.00 mg"));
    assert!(output.contains("Final maintenance dose: 29.40 mg/hr"));
    assert!(output.contains("Total maintenance dose: 58.80 mg"));

    let log = FeedbackLog::open(&audit).unwrap();
    let records = log.load().unwrap();
    assert_eq!(records.len(), 2);
    assert!(!records[0].approved);
    assert_eq!(records[0].correct_doses, TargetDoses::new(2.5, 7.0));
    assert_eq!(records[0].target, TargetDoses::new(2.5, 7.0));
    assert!(records[1].approved);
    // The approval keeps the earlier correction as the target
    assert_eq!(records[1].target, TargetDoses::new(2.5, 7.0));
    assert_eq!(log.corrections().unwrap().len(), 1);

    let (_, policy) = session.into_parts();
    assert_eq!(policy.num_timesteps(), 128);
}

#[test]
fn test_finetuned_policy_can_be_saved_and_reloaded() {
    let dir = TempDir::new().unwrap();
    let mut session = trained_session(&dir.path().join("feedback.jsonl"));

    let mut console = scripted("60\n1.5\n30\nno\n2\n6\nno\n");
    run_interactive(&mut session, &mut console).unwrap();

    let (_, policy) = session.into_parts();
    let path = dir.path().join("ppo_anesthesia_finetuned.json");
    policy.save(&path).unwrap();
    let reloaded = PpoPolicy::load(&path).unwrap();
    assert_eq!(reloaded.num_timesteps(), policy.num_timesteps());
}

#[test]
fn test_malformed_input_ends_session() {
    let dir = TempDir::new().unwrap();
    let mut session = trained_session(&dir.path().join("feedback.jsonl"));

    let mut console = scripted("seventy\n");
    let err = run_interactive(&mut session, &mut console).unwrap_err();
    match err.downcast_ref::<InputError>() {
        Some(InputError::Parse { field, .. }) => assert_eq!(*field, "weight"),
        other => panic!("unexpected error {:?}", other),
    }
    assert!(!session.fine_tuned());
}

#[test]
fn test_closed_input_mid_consultation() {
    let dir = TempDir::new().unwrap();
    let mut session = trained_session(&dir.path().join("feedback.jsonl"));

    let mut console = scripted("70\n2\n40\n");
    let err = run_interactive(&mut session, &mut console).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<InputError>(),
        Some(InputError::UnexpectedEof("approval"))
    ));
}
