//! End-to-end treatment scenarios against the scripted backend.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use canopy_core::{
    ProjectAreaId, StandId, StandSelectionStore, TreatedStand, TreatedStandRegistry,
    TreatmentPlanId, stand_ids,
};
use canopy_runtime::testing::{BackendCall, ScriptedBackend, single_area_summary};
use canopy_runtime::{MutationPolicy, OrchestratorState, TreatmentError, TreatmentOrchestrator};

const PLAN: TreatmentPlanId = TreatmentPlanId(21);
const AREA: ProjectAreaId = ProjectAreaId(5);

struct Fixture {
    orchestrator: TreatmentOrchestrator<ScriptedBackend>,
    backend: Arc<ScriptedBackend>,
    selection: StandSelectionStore,
    registry: TreatedStandRegistry,
}

fn fixture() -> Fixture {
    let backend = Arc::new(
        ScriptedBackend::new().with_summary(single_area_summary(PLAN, AREA, "cut", &[1, 2, 3])),
    );
    let selection = StandSelectionStore::default();
    let registry = TreatedStandRegistry::new();
    let mut orchestrator =
        TreatmentOrchestrator::new(Arc::clone(&backend), registry.clone(), selection.clone());
    orchestrator.set_treatment_plan_id(PLAN);
    orchestrator.set_project_area_id(Some(AREA));
    orchestrator.load_summary().expect("summary loads");
    Fixture {
        orchestrator,
        backend,
        selection,
        registry,
    }
}

fn entries(pairs: &[(i64, &str)]) -> Vec<TreatedStand> {
    pairs
        .iter()
        .map(|(id, action)| TreatedStand::new(StandId(*id), *action))
        .collect()
}

#[test]
fn scenario_a_summary_populates_registry() {
    let f = fixture();
    assert_eq!(
        f.registry.all(),
        entries(&[(1, "cut"), (2, "cut"), (3, "cut")])
    );
    assert_eq!(f.orchestrator.state(), OrchestratorState::Ready);
    assert_eq!(f.backend.calls(), vec![BackendCall::Summary(PLAN)]);
}

#[test]
fn scenario_b_assign_is_visible_before_backend_answers() {
    let mut f = fixture();
    f.selection.toggle(StandId(4));
    f.selection.toggle(StandId(5));

    let seen: Rc<RefCell<Vec<usize>>> = Rc::default();
    let sink = Rc::clone(&seen);
    let _sub = f.registry.subscribe(move |all| sink.borrow_mut().push(all.len()));

    let ids = f.selection.selected_ids();
    f.orchestrator.assign("burn", &ids).expect("assign succeeds");

    assert_eq!(
        f.registry.all(),
        entries(&[(1, "cut"), (2, "cut"), (3, "cut"), (4, "burn"), (5, "burn")])
    );
    assert!(f.selection.is_empty());
    assert_eq!(*seen.borrow(), vec![5]);
}

#[test]
fn scenario_b_failure_reverts_to_scenario_a() {
    let mut f = fixture();
    f.backend.fail_mutations(true);
    f.selection.replace_selection(stand_ids(&[4, 5]));

    let seen: Rc<RefCell<Vec<usize>>> = Rc::default();
    let sink = Rc::clone(&seen);
    let _sub = f.registry.subscribe(move |all| sink.borrow_mut().push(all.len()));

    let ids = f.selection.selected_ids();
    let err = f.orchestrator.assign("burn", &ids).unwrap_err();
    assert!(err.is_recoverable());

    // Subscribers saw the optimistic state, then the revert.
    assert_eq!(*seen.borrow(), vec![5, 3]);
    assert_eq!(
        f.registry.all(),
        entries(&[(1, "cut"), (2, "cut"), (3, "cut")])
    );

    // The cleared selection can still be brought back.
    assert!(f.selection.undo());
    assert_eq!(f.selection.selected_ids(), stand_ids(&[4, 5]));
}

#[test]
fn scenario_c_remove_kept_on_success() {
    let mut f = fixture();
    f.orchestrator
        .remove(&stand_ids(&[2, 3]))
        .expect("remove succeeds");
    assert_eq!(f.registry.all(), entries(&[(1, "cut")]));
    assert_eq!(
        f.backend.calls().last(),
        Some(&BackendCall::RemoveTreatments {
            plan: PLAN,
            stand_ids: stand_ids(&[2, 3]),
        })
    );
}

#[test]
fn scenario_c_remove_reverted_on_failure() {
    let mut f = fixture();
    f.backend.fail_mutations(true);
    assert!(f.orchestrator.remove(&stand_ids(&[2, 3])).is_err());
    assert_eq!(
        f.registry.all(),
        entries(&[(1, "cut"), (2, "cut"), (3, "cut")])
    );
}

#[test]
fn merge_upserts_across_consecutive_assigns() {
    let mut f = fixture();
    f.orchestrator.assign("A", &stand_ids(&[1])).unwrap();
    f.orchestrator.assign("B", &stand_ids(&[1])).unwrap();
    assert_eq!(
        f.registry.all(),
        entries(&[(1, "B"), (2, "cut"), (3, "cut")])
    );
}

#[test]
fn unscoped_mutation_never_reaches_backend() {
    let backend = Arc::new(ScriptedBackend::new());
    let mut orchestrator = TreatmentOrchestrator::new(
        Arc::clone(&backend),
        TreatedStandRegistry::new(),
        StandSelectionStore::default(),
    );
    let err = orchestrator.assign("burn", &stand_ids(&[1])).unwrap_err();
    assert!(matches!(err, TreatmentError::Scope(_)));

    orchestrator.set_treatment_plan_id(PLAN);
    let err = orchestrator.remove(&stand_ids(&[1])).unwrap_err();
    assert!(matches!(err, TreatmentError::Scope(_)));
    assert!(backend.calls().is_empty());
}

#[test]
fn failed_summary_leaves_registry_untouched() {
    let mut f = fixture();
    f.backend.fail_reads(true);
    f.orchestrator.set_project_area_id(Some(AREA));
    let err = f.orchestrator.load_summary().unwrap_err();
    assert!(matches!(err, TreatmentError::Network(_)));
    assert_eq!(f.registry.len(), 3);
}

#[test]
fn concurrent_policy_is_selectable() {
    let f = fixture();
    let orchestrator = f.orchestrator.with_policy(MutationPolicy::Concurrent);
    assert_eq!(orchestrator.policy(), MutationPolicy::Concurrent);
}
