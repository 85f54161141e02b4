use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use stocker_core::{Entity, EntityId};
use stocker_persistence::session::{InMemorySession, InMemoryStore};
use stocker_persistence::{
    CancelSignal, NoopSink, PersistentEntity, Repository, TransactionOp, UnitOfWork, UowError,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Note {
    id: EntityId,
    body: String,
}

impl Entity for Note {
    type Id = EntityId;
    fn id(&self) -> &EntityId {
        &self.id
    }
}

impl PersistentEntity for Note {
    const ENTITY_TYPE: &'static str = "note";
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Begin,
    Commit,
    Rollback,
    Stage,
    Save,
    FailNextBegin,
    FailNextFlush,
    FailNextCommit,
    FailNextRollback,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Begin),
        3 => Just(Op::Commit),
        2 => Just(Op::Rollback),
        3 => Just(Op::Stage),
        1 => Just(Op::Save),
        1 => Just(Op::FailNextBegin),
        1 => Just(Op::FailNextFlush),
        1 => Just(Op::FailNextCommit),
        1 => Just(Op::FailNextRollback),
    ]
}

fn is_invalid(res: &Result<(), UowError>, expected: TransactionOp) -> bool {
    matches!(res, Err(UowError::InvalidState { operation, .. }) if *operation == expected)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        ..ProptestConfig::default()
    })]

    /// Property: `has_active_transaction` is true iff a successful begin has
    /// happened with no commit or rollback since; misuse is always rejected
    /// with `InvalidState`, and the session never keeps a transaction the
    /// unit of work does not know about.
    #[test]
    fn active_flag_tracks_successful_begins(ops in prop::collection::vec(op(), 1..40)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async {
            let session = InMemorySession::arc(InMemoryStore::arc());
            let uow = UnitOfWork::builder()
                .context("prop")
                .session(session.clone())
                .sink(NoopSink)
                .build()
                .unwrap();
            let cancel = CancelSignal::none();
            let mut active = false;

            for op in ops {
                match op {
                    Op::Begin => {
                        let res = uow.begin_transaction(&cancel).await;
                        prop_assert_eq!(is_invalid(&res, TransactionOp::Begin), active);
                        if res.is_ok() {
                            active = true;
                        }
                    }
                    Op::Commit => {
                        let res = uow.commit_transaction(&cancel).await;
                        prop_assert_eq!(is_invalid(&res, TransactionOp::Commit), !active);
                        active = false;
                    }
                    Op::Rollback => {
                        let res = uow.rollback_transaction(&cancel).await;
                        prop_assert_eq!(is_invalid(&res, TransactionOp::Rollback), !active);
                        active = false;
                    }
                    Op::Stage => {
                        let repo = uow.repository::<Note>().unwrap();
                        repo.add(Note { id: EntityId::new(), body: "x".into() }).await.unwrap();
                    }
                    Op::Save => {
                        let _ = uow.save_changes(&cancel).await;
                    }
                    Op::FailNextBegin => session.fail_next_begin("begin"),
                    Op::FailNextFlush => session.fail_next_flush("flush"),
                    Op::FailNextCommit => session.fail_next_commit("commit"),
                    Op::FailNextRollback => session.fail_next_rollback("rollback"),
                }

                prop_assert_eq!(uow.has_active_transaction(), active);
                prop_assert_eq!(session.has_open_transaction(), active);
            }

            // After any terminal operation a fresh begin succeeds.
            if active {
                let _ = uow.rollback_transaction(&cancel).await;
            }
            session.set_faults(Default::default());
            prop_assert!(uow.begin_transaction(&cancel).await.is_ok());
            prop_assert!(uow.dispose().await.is_ok());
            prop_assert!(!uow.has_active_transaction());
            Ok(())
        })?;
    }
}
