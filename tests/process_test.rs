/*!
 * Process Manager Integration Tests
 * Lifecycle, sleeping, waiting, and teardown driven through the event queue
 */

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use simproc::{
    Context, Engine, Event, EventQueue, Pid, Process, ProcessError, ProcessManager, ProcessState,
    SimTime,
};
use std::sync::Arc;

type Log = Arc<Mutex<Vec<(&'static str, SimTime)>>>;

fn setup(min_delay: SimTime) -> (Arc<EventQueue>, ProcessManager) {
    let _ = env_logger::builder().is_test(true).try_init();
    let queue = Arc::new(EventQueue::new(min_delay));
    let manager = ProcessManager::new(queue.clone());
    (queue, manager)
}

struct Sleeper {
    label: &'static str,
    duration: SimTime,
    log: Log,
}

impl Process for Sleeper {
    fn run(&mut self, ctx: &Context<'_>) {
        self.log.lock().push((self.label, ctx.now()));
        ctx.sleep(self.duration).unwrap();
        self.log.lock().push((self.label, ctx.now()));
    }
}

struct Doze {
    label: &'static str,
    log: Log,
}

impl Process for Doze {
    fn run(&mut self, ctx: &Context<'_>) {
        self.log.lock().push((self.label, ctx.now()));
        ctx.sleep_until_woken().unwrap();
        self.log.lock().push((self.label, ctx.now()));
    }
}

#[test]
fn test_process_runs_to_completion_and_ends() {
    struct OneShot {
        log: Log,
    }
    impl Process for OneShot {
        fn run(&mut self, ctx: &Context<'_>) {
            self.log.lock().push(("run", ctx.now()));
        }
        fn end(&mut self) {
            self.log.lock().push(("end", 0));
        }
    }

    let (queue, manager) = setup(1);
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let pid = manager
        .schedule_new(OneShot { log: log.clone() }, 3, None)
        .unwrap();
    assert_eq!(manager.state(pid).unwrap(), ProcessState::Scheduled);

    queue.drain(&manager).unwrap();

    assert_eq!(manager.state(pid).unwrap(), ProcessState::Inactive);
    assert_eq!(*log.lock(), vec![("run", 3), ("end", 0)]);
}

#[test]
fn test_sleep_resumes_at_exact_time_once() {
    let (queue, manager) = setup(1);
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let pid = manager
        .schedule_new(
            Sleeper {
                label: "s",
                duration: 7,
                log: log.clone(),
            },
            0,
            None,
        )
        .unwrap();

    queue.drain(&manager).unwrap();

    assert_eq!(*log.lock(), vec![("s", 0), ("s", 7)]);
    assert_eq!(queue.pending(), 0);
    assert_eq!(manager.state(pid).unwrap(), ProcessState::Inactive);
}

#[test]
fn test_explicit_wake_arrives_after_minimum_delay() {
    struct Waker {
        target: Pid,
        log: Log,
    }
    impl Process for Waker {
        fn run(&mut self, ctx: &Context<'_>) {
            self.log.lock().push(("w", ctx.now()));
            ctx.manager().wake(self.target).unwrap();
        }
    }

    let (queue, manager) = setup(1);
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let doze = manager
        .schedule_new(
            Doze {
                label: "d",
                log: log.clone(),
            },
            0,
            None,
        )
        .unwrap();
    manager
        .schedule_new(
            Waker {
                target: doze,
                log: log.clone(),
            },
            5,
            None,
        )
        .unwrap();

    queue.drain(&manager).unwrap();

    assert_eq!(*log.lock(), vec![("d", 0), ("w", 5), ("d", 6)]);
}

#[test]
fn test_wake_of_non_sleeping_process_is_a_noop() {
    let (queue, manager) = setup(1);
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let pid = manager
        .schedule_new(
            Sleeper {
                label: "s",
                duration: 2,
                log: log.clone(),
            },
            5,
            None,
        )
        .unwrap();

    // Still Scheduled: the wake is dropped, no event is posted.
    manager.wake(pid).unwrap();
    assert_eq!(queue.pending(), 1);

    queue.drain(&manager).unwrap();
    assert_eq!(*log.lock(), vec![("s", 5), ("s", 7)]);
}

#[test]
fn test_stale_wake_after_kill_is_ignored() {
    struct Reaper {
        target: Pid,
    }
    impl Process for Reaper {
        fn run(&mut self, ctx: &Context<'_>) {
            ctx.kill(self.target).unwrap();
        }
    }

    let (queue, manager) = setup(1);
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let victim = manager
        .schedule_new(
            Sleeper {
                label: "v",
                duration: 5,
                log: log.clone(),
            },
            0,
            None,
        )
        .unwrap();
    manager
        .schedule_new(Reaper { target: victim }, 2, None)
        .unwrap();

    // The wake posted for t=5 arrives after the kill and is dropped.
    queue.drain(&manager).unwrap();

    assert_eq!(*log.lock(), vec![("v", 0)]);
    assert_eq!(manager.state(victim).unwrap(), ProcessState::Inactive);
}

#[test]
fn test_activation_of_live_process_is_fatal() {
    let (queue, manager) = setup(1);
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let pid = manager
        .schedule_new(
            Sleeper {
                label: "s",
                duration: 10,
                log,
            },
            0,
            None,
        )
        .unwrap();

    // A second activation while the process sleeps indicates a diverged
    // model and must abort the drain.
    queue.post(Event::Activate(pid), 1);
    match queue.drain(&manager) {
        Err(ProcessError::UnexpectedEvent { pid: p, state, .. }) => {
            assert_eq!(p, pid);
            assert_eq!(state, ProcessState::Sleeping);
        }
        other => panic!("expected UnexpectedEvent, got {:?}", other),
    }
}

#[test]
fn test_kill_of_inactive_process_is_a_noop() {
    let (queue, manager) = setup(1);
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let pid = manager
        .schedule_new(
            Sleeper {
                label: "s",
                duration: 1,
                log: log.clone(),
            },
            0,
            None,
        )
        .unwrap();
    queue.drain(&manager).unwrap();

    assert_eq!(manager.state(pid).unwrap(), ProcessState::Inactive);
    manager.kill(pid).unwrap();
    assert_eq!(manager.state(pid).unwrap(), ProcessState::Inactive);
}

#[test]
fn test_self_kill_is_rejected_and_process_continues() {
    struct SelfKiller {
        log: Log,
    }
    impl Process for SelfKiller {
        fn run(&mut self, ctx: &Context<'_>) {
            let err = ctx.kill(ctx.pid()).unwrap_err();
            assert_eq!(err, ProcessError::SelfKill(ctx.pid()));
            self.log.lock().push(("continued", ctx.now()));
        }
    }

    let (queue, manager) = setup(1);
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let pid = manager
        .schedule_new(SelfKiller { log: log.clone() }, 0, None)
        .unwrap();
    queue.drain(&manager).unwrap();

    assert_eq!(*log.lock(), vec![("continued", 0)]);
    assert_eq!(manager.state(pid).unwrap(), ProcessState::Inactive);
}

#[test]
fn test_kill_all_of_own_subtree_is_rejected() {
    struct SubtreeKiller;
    impl Process for SubtreeKiller {
        fn run(&mut self, ctx: &Context<'_>) {
            let err = ctx.kill_all(ctx.pid()).unwrap_err();
            assert_eq!(err, ProcessError::SelfKill(ctx.pid()));
        }
    }

    let (queue, manager) = setup(1);
    manager.schedule_new(SubtreeKiller, 0, None).unwrap();
    queue.drain(&manager).unwrap();
}

#[test]
fn test_schedule_rejects_live_process_but_allows_reuse() {
    let (queue, manager) = setup(1);
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let pid = manager
        .schedule_new(
            Sleeper {
                label: "s",
                duration: 2,
                log: log.clone(),
            },
            5,
            None,
        )
        .unwrap();

    match manager.schedule(pid, 3, None) {
        Err(ProcessError::AlreadyLive { state, .. }) => {
            assert_eq!(state, ProcessState::Scheduled)
        }
        other => panic!("expected AlreadyLive, got {:?}", other),
    }

    queue.drain(&manager).unwrap();
    assert_eq!(manager.state(pid).unwrap(), ProcessState::Inactive);

    // A finished record may be scheduled again.
    manager.schedule(pid, 1, None).unwrap();
    queue.drain(&manager).unwrap();
    assert_eq!(*log.lock(), vec![("s", 5), ("s", 7), ("s", 8), ("s", 10)]);
}

#[test]
fn test_wait_for_dormant_child_runs_it_and_resumes_waiter() {
    struct Waiter {
        child: Pid,
        log: Log,
    }
    impl Process for Waiter {
        fn run(&mut self, ctx: &Context<'_>) {
            self.log.lock().push(("p-start", ctx.now()));
            ctx.wait_for(self.child).unwrap();
            self.log.lock().push(("p-resume", ctx.now()));
        }
    }

    let (queue, manager) = setup(1);
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let child = manager.add_process(Sleeper {
        label: "c",
        duration: 3,
        log: log.clone(),
    });
    assert_eq!(manager.state(child).unwrap(), ProcessState::Inactive);

    let parent = manager
        .schedule_new(
            Waiter {
                child,
                log: log.clone(),
            },
            0,
            None,
        )
        .unwrap();
    queue.drain(&manager).unwrap();

    assert_eq!(
        *log.lock(),
        vec![("p-start", 0), ("c", 0), ("c", 3), ("p-resume", 3)]
    );
    assert_eq!(manager.info(child).unwrap().parent, Some(parent));
    assert_eq!(manager.state(parent).unwrap(), ProcessState::Inactive);
}

#[test]
fn test_wait_for_unknown_process_is_an_error() {
    struct BadWaiter;
    impl Process for BadWaiter {
        fn run(&mut self, ctx: &Context<'_>) {
            let err = ctx.wait_for(9999).unwrap_err();
            assert_eq!(err, ProcessError::NotFound(9999));
        }
    }

    let (queue, manager) = setup(1);
    manager.schedule_new(BadWaiter, 0, None).unwrap();
    queue.drain(&manager).unwrap();
}

#[test]
fn test_waiter_resumes_when_awaited_process_is_killed() {
    struct Waiter {
        child: Pid,
        log: Log,
    }
    impl Process for Waiter {
        fn run(&mut self, ctx: &Context<'_>) {
            ctx.wait_for(self.child).unwrap();
            self.log.lock().push(("p-resume", ctx.now()));
        }
    }
    struct Reaper {
        target: Pid,
    }
    impl Process for Reaper {
        fn run(&mut self, ctx: &Context<'_>) {
            ctx.kill(self.target).unwrap();
        }
    }

    let (queue, manager) = setup(1);
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let child = manager
        .schedule_new(
            Doze {
                label: "c",
                log: log.clone(),
            },
            0,
            None,
        )
        .unwrap();
    manager
        .schedule_new(
            Waiter {
                child,
                log: log.clone(),
            },
            1,
            None,
        )
        .unwrap();
    manager
        .schedule_new(Reaper { target: child }, 4, None)
        .unwrap();

    queue.drain(&manager).unwrap();

    // The kill lands at t=4; the orphaned waiter resumes one tick later.
    assert_eq!(*log.lock(), vec![("c", 0), ("p-resume", 5)]);
    assert_eq!(manager.state(child).unwrap(), ProcessState::Inactive);
}

#[test]
fn test_killed_waiter_does_not_resume_when_awaited_process_ends() {
    struct Waiter {
        child: Pid,
        log: Log,
    }
    impl Process for Waiter {
        fn run(&mut self, ctx: &Context<'_>) {
            ctx.wait_for(self.child).unwrap();
            self.log.lock().push(("w-resume", ctx.now()));
        }
    }
    struct Reaper {
        target: Pid,
    }
    impl Process for Reaper {
        fn run(&mut self, ctx: &Context<'_>) {
            ctx.kill(self.target).unwrap();
        }
    }

    let (queue, manager) = setup(1);
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let child = manager
        .schedule_new(
            Sleeper {
                label: "c",
                duration: 10,
                log: log.clone(),
            },
            0,
            None,
        )
        .unwrap();
    let waiter = manager
        .schedule_new(
            Waiter {
                child,
                log: log.clone(),
            },
            1,
            None,
        )
        .unwrap();
    manager
        .schedule_new(Reaper { target: waiter }, 3, None)
        .unwrap();

    // The waiter dies at t=3; the child's completion at t=10 must not
    // try to resume it.
    queue.drain(&manager).unwrap();

    assert_eq!(*log.lock(), vec![("c", 0), ("c", 10)]);
    assert_eq!(manager.state(waiter).unwrap(), ProcessState::Inactive);
    assert_eq!(manager.state(child).unwrap(), ProcessState::Inactive);
}

#[test]
fn test_second_waiter_on_same_process_is_rejected() {
    struct FirstWaiter {
        child: Pid,
        log: Log,
    }
    impl Process for FirstWaiter {
        fn run(&mut self, ctx: &Context<'_>) {
            ctx.wait_for(self.child).unwrap();
            self.log.lock().push(("w1-resume", ctx.now()));
        }
    }
    struct SecondWaiter {
        child: Pid,
        log: Log,
    }
    impl Process for SecondWaiter {
        fn run(&mut self, ctx: &Context<'_>) {
            let err = ctx.wait_for(self.child).unwrap_err();
            assert!(matches!(err, ProcessError::AlreadyAwaited { .. }));
            self.log.lock().push(("w2-rejected", ctx.now()));
        }
    }

    let (queue, manager) = setup(1);
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let child = manager
        .schedule_new(
            Sleeper {
                label: "c",
                duration: 5,
                log: log.clone(),
            },
            0,
            None,
        )
        .unwrap();
    manager
        .schedule_new(
            FirstWaiter {
                child,
                log: log.clone(),
            },
            1,
            None,
        )
        .unwrap();
    manager
        .schedule_new(
            SecondWaiter {
                child,
                log: log.clone(),
            },
            2,
            None,
        )
        .unwrap();

    queue.drain(&manager).unwrap();

    assert_eq!(
        *log.lock(),
        vec![("c", 0), ("w2-rejected", 2), ("c", 5), ("w1-resume", 5)]
    );
}

#[test]
fn test_exactly_one_coroutine_is_active_at_a_time() {
    struct Child {
        waiter: Arc<Mutex<Option<Pid>>>,
        log: Log,
    }
    impl Process for Child {
        fn run(&mut self, ctx: &Context<'_>) {
            assert_eq!(ctx.manager().current(), Some(ctx.pid()));
            // The process that scheduled us is suspended, not Active.
            let waiter = self.waiter.lock().unwrap();
            assert_eq!(
                ctx.manager().state(waiter).unwrap(),
                ProcessState::WaitingForChild
            );
            self.log.lock().push(("child", ctx.now()));
        }
    }
    struct Waiter {
        child: Pid,
        me: Arc<Mutex<Option<Pid>>>,
        log: Log,
    }
    impl Process for Waiter {
        fn run(&mut self, ctx: &Context<'_>) {
            assert_eq!(ctx.manager().current(), Some(ctx.pid()));
            *self.me.lock() = Some(ctx.pid());
            ctx.wait_for(self.child).unwrap();
            assert_eq!(ctx.manager().current(), Some(ctx.pid()));
            assert_eq!(
                ctx.manager().state(self.child).unwrap(),
                ProcessState::Inactive
            );
            self.log.lock().push(("waiter", ctx.now()));
        }
    }

    let (queue, manager) = setup(1);
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let me = Arc::new(Mutex::new(None));
    let child = manager.add_process(Child {
        waiter: me.clone(),
        log: log.clone(),
    });
    manager
        .schedule_new(
            Waiter {
                child,
                me,
                log: log.clone(),
            },
            1,
            None,
        )
        .unwrap();

    assert_eq!(manager.current(), None);
    queue.drain(&manager).unwrap();
    assert_eq!(manager.current(), None);
    assert_eq!(*log.lock(), vec![("child", 1), ("waiter", 1)]);
}

#[test]
fn test_spawn_links_parent_and_child() {
    struct Child {
        log: Log,
    }
    impl Process for Child {
        fn run(&mut self, ctx: &Context<'_>) {
            self.log.lock().push(("child", ctx.now()));
        }
    }
    struct Parent {
        log: Log,
        spawned: Arc<Mutex<Option<Pid>>>,
    }
    impl Process for Parent {
        fn run(&mut self, ctx: &Context<'_>) {
            let pid = ctx
                .spawn(Child {
                    log: self.log.clone(),
                })
                .unwrap();
            *self.spawned.lock() = Some(pid);
            self.log.lock().push(("parent", ctx.now()));
        }
    }

    let (queue, manager) = setup(2);
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let spawned = Arc::new(Mutex::new(None));
    let parent = manager
        .schedule_new(
            Parent {
                log: log.clone(),
                spawned: spawned.clone(),
            },
            0,
            None,
        )
        .unwrap();
    queue.drain(&manager).unwrap();

    let child = spawned.lock().unwrap();
    // The child activates one lookahead delay after the spawn.
    assert_eq!(*log.lock(), vec![("parent", 0), ("child", 2)]);
    assert_eq!(manager.info(child).unwrap().parent, Some(parent));
    assert_eq!(manager.info(parent).unwrap().children, vec![child]);
}

#[test]
fn test_kill_all_tears_down_children_before_parents() {
    type Ends = Arc<Mutex<Vec<&'static str>>>;

    struct Leaf {
        label: &'static str,
        ends: Ends,
    }
    impl Process for Leaf {
        fn run(&mut self, ctx: &Context<'_>) {
            ctx.sleep_until_woken().unwrap();
        }
        fn end(&mut self) {
            self.ends.lock().push(self.label);
        }
    }

    struct Mid {
        label: &'static str,
        ends: Ends,
    }
    impl Process for Mid {
        fn run(&mut self, ctx: &Context<'_>) {
            ctx.spawn(Leaf {
                label: "G",
                ends: self.ends.clone(),
            })
            .unwrap();
            ctx.sleep_until_woken().unwrap();
        }
        fn end(&mut self) {
            self.ends.lock().push(self.label);
        }
    }

    struct Top {
        label: &'static str,
        ends: Ends,
    }
    impl Process for Top {
        fn run(&mut self, ctx: &Context<'_>) {
            ctx.spawn(Mid {
                label: "C1",
                ends: self.ends.clone(),
            })
            .unwrap();
            ctx.spawn(Leaf {
                label: "C2",
                ends: self.ends.clone(),
            })
            .unwrap();
            ctx.sleep_until_woken().unwrap();
        }
        fn end(&mut self) {
            self.ends.lock().push(self.label);
        }
    }

    struct Reaper {
        target: Pid,
    }
    impl Process for Reaper {
        fn run(&mut self, ctx: &Context<'_>) {
            ctx.kill_all(self.target).unwrap();
        }
    }

    let (queue, manager) = setup(1);
    let ends: Ends = Arc::new(Mutex::new(Vec::new()));
    let top = manager
        .schedule_new(
            Top {
                label: "P",
                ends: ends.clone(),
            },
            0,
            None,
        )
        .unwrap();
    manager.schedule_new(Reaper { target: top }, 5, None).unwrap();

    queue.drain(&manager).unwrap();

    assert_eq!(*ends.lock(), vec!["G", "C1", "C2", "P"]);
    let info = manager.info(top).unwrap();
    assert_eq!(info.state, ProcessState::Inactive);
    for child in info.children {
        assert_eq!(manager.state(child).unwrap(), ProcessState::Inactive);
    }
}
