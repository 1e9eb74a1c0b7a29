/*!
 * Scheduler Tests
 * Policy changes, TP schedules and quota groups through the nucleus
 */

use pretty_assertions::assert_eq;
use rt_nucleus::scheduler::priority_range;
use rt_nucleus::{
    CoreError, Nucleus, NucleusConfig, ParamEx, Policy, SchedClass, SchedParam, ThreadAttr,
    TpWindowSpec,
};
use std::time::Duration;

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

fn nucleus() -> Nucleus {
    Nucleus::new(NucleusConfig::default()).unwrap()
}

fn contiguous() -> Vec<TpWindowSpec> {
    vec![
        TpWindowSpec::new(ms(0), ms(10), 0),
        TpWindowSpec::new(ms(10), ms(15), 1),
        TpWindowSpec::idle(ms(25), ms(5)),
    ]
}

#[test]
fn test_out_of_range_priorities_change_nothing() {
    let nucleus = nucleus();
    let thread = nucleus.spawn_thread(ThreadAttr::new(40)).unwrap();
    let before = nucleus.thread_policy(&thread).unwrap();

    for policy in Policy::ALL {
        let (_, max) = priority_range(policy);
        let param = ParamEx::priority(max + 1)
            .with_rr_quantum(ms(1))
            .with_partition(0);
        let result = nucleus.set_thread_policy(&thread, policy, &param);
        assert!(
            matches!(result, Err(CoreError::InvalidArgument(_))),
            "{} accepted priority {}",
            policy.as_str(),
            max + 1
        );
        assert_eq!(nucleus.thread_policy(&thread).unwrap(), before);
    }
}

#[test]
fn test_policy_switches_update_weight() {
    let nucleus = nucleus();
    let thread = nucleus.spawn_thread(ThreadAttr::new(40)).unwrap();
    assert_eq!(thread.weighted_priority(), 4 * 1024 + 40);

    let rr = nucleus
        .set_thread_policy(&thread, Policy::RoundRobin, &ParamEx::priority(12).with_rr_quantum(ms(3)))
        .unwrap();
    assert_eq!(rr.time_slice, Some(ms(3)));

    // The configured slice carries over
    let rr = nucleus
        .set_thread_policy(&thread, Policy::RoundRobin, &ParamEx::priority(14))
        .unwrap();
    assert_eq!(
        rr.param,
        SchedParam::RoundRobin {
            priority: 14,
            slice: ms(3)
        }
    );

    let weak = nucleus
        .set_thread_policy(&thread, Policy::Fifo, &ParamEx::priority(-20))
        .unwrap();
    assert_eq!(weak.class, SchedClass::Weak);
    assert_eq!(thread.weighted_priority(), 1024 + 20);

    let tp = nucleus
        .set_thread_policy(&thread, Policy::Tp, &ParamEx::priority(9).with_partition(2))
        .unwrap();
    assert_eq!(tp.class, SchedClass::Tp);
    assert_eq!(thread.weighted_priority(), 2 * 1024 + 9);
}

#[test]
fn test_sporadic_admission_checks() {
    let nucleus = nucleus();
    let thread = nucleus.spawn_thread(ThreadAttr::new(40)).unwrap();

    let good = ParamEx::priority(30).with_sporadic(10, ms(2), ms(20), 4);
    let policy = nucleus.set_thread_policy(&thread, Policy::Sporadic, &good).unwrap();
    assert_eq!(policy.class, SchedClass::Sporadic);

    let bad_period = ParamEx::priority(30).with_sporadic(10, ms(20), ms(2), 4);
    assert!(nucleus.set_thread_policy(&thread, Policy::Sporadic, &bad_period).is_err());
    assert_eq!(nucleus.thread_policy(&thread).unwrap(), policy);
}

#[test]
fn test_priority_queries() {
    let nucleus = nucleus();
    assert_eq!(nucleus.min_priority(Policy::Weak), 0);
    assert_eq!(nucleus.max_priority(Policy::Weak), 99);
    assert_eq!(nucleus.max_priority(Policy::Core), 259);
    assert_eq!(
        nucleus.weighted_priority(Policy::Quota, &ParamEx::priority(7)).unwrap(),
        3 * 1024 + 7
    );
    assert!(nucleus.weighted_priority(Policy::Normal, &ParamEx::priority(3)).is_err());
}

#[test]
fn test_tp_schedule_replacement_is_atomic() {
    let nucleus = nucleus();
    assert_eq!(nucleus.tp_schedule(0).unwrap(), None);

    nucleus.set_tp_schedule(0, &contiguous()).unwrap();
    let installed = nucleus.tp_schedule(0).unwrap().unwrap();
    assert_eq!(installed.windows, contiguous());
    assert_eq!(installed.cycle, ms(30));

    let mut broken = contiguous();
    broken.swap(1, 2);
    assert!(matches!(nucleus.set_tp_schedule(0, &broken), Err(CoreError::InvalidArgument(_))));
    assert_eq!(nucleus.tp_schedule(0).unwrap(), Some(installed));

    assert!(nucleus.tp_active_window(0).unwrap().is_some());
    assert!(nucleus.tp_schedule(1).unwrap().is_none());
    assert!(nucleus.set_tp_schedule(99, &contiguous()).is_err());

    nucleus.set_tp_schedule(0, &[]).unwrap();
    assert_eq!(nucleus.tp_schedule(0).unwrap(), None);
    assert_eq!(nucleus.tp_active_window(0).unwrap(), None);
}

#[test]
fn test_quota_over_commit_reported() {
    let nucleus = nucleus();
    let caller = nucleus.spawn_thread(ThreadAttr::new(10)).unwrap();
    let a = nucleus.quota_add_group(&caller, 1, true).unwrap();
    let b = nucleus.quota_add_group(&caller, 1, true).unwrap();
    assert_eq!(b.quota_sum, 200);

    assert_eq!(nucleus.quota_set_limit(&caller, a.group, 60, 60).unwrap().quota_sum, 160);
    assert_eq!(nucleus.quota_set_limit(&caller, b.group, 70, 90).unwrap().quota_sum, 130);

    let other = nucleus.quota_add_group_with_limit(&caller, 2, true, 60, 60).unwrap();
    assert_eq!(other.quota_sum, 60);
    assert_ne!(other.group, a.group);
}

#[test]
fn test_quota_members_and_removal() {
    let nucleus = nucleus();
    let admin = nucleus.spawn_thread(ThreadAttr::new(10).in_process(300)).unwrap();
    let worker = nucleus.spawn_thread(ThreadAttr::new(10).in_process(300)).unwrap();
    let group = nucleus.quota_add_group(&admin, 0, false).unwrap().group;

    nucleus
        .set_thread_policy(&worker, Policy::Quota, &ParamEx::priority(25).with_quota_group(group))
        .unwrap();
    assert_eq!(nucleus.quota_group_info(&admin, group).unwrap().members, 1);

    // Busy group survives an unforced removal
    assert!(matches!(
        nucleus.quota_remove_group(&admin, group, false),
        Err(CoreError::InvalidArgument(_))
    ));
    assert!(nucleus.quota_group_info(&admin, group).is_ok());

    let info = nucleus.quota_remove_group(&admin, group, true).unwrap();
    assert_eq!(info.quota_sum, 0);
    let policy = nucleus.thread_policy(&worker).unwrap();
    assert_eq!(policy.class, SchedClass::Rt);
    assert_eq!(policy.param, SchedParam::Core { priority: 25 });

    assert!(matches!(
        nucleus.quota_group_info(&admin, group),
        Err(CoreError::NoSuchEntity(_))
    ));
}

#[test]
fn test_private_groups_hidden_and_cleaned_up() {
    let nucleus = nucleus();
    let owner = nucleus.spawn_thread(ThreadAttr::new(10).in_process(400)).unwrap();
    let stranger = nucleus.spawn_thread(ThreadAttr::new(10).in_process(401)).unwrap();
    let group = nucleus.quota_add_group(&owner, 0, false).unwrap().group;

    assert!(matches!(
        nucleus.quota_set_limit(&stranger, group, 10, 10),
        Err(CoreError::NoSuchEntity(_))
    ));
    assert!(matches!(
        nucleus.set_thread_policy(&stranger, Policy::Quota, &ParamEx::priority(5).with_quota_group(group)),
        Err(CoreError::NoSuchEntity(_))
    ));

    assert_eq!(nucleus.quota_cleanup(400), 1);
    assert!(nucleus.quota_group_info(&owner, group).is_err());
}

#[test]
fn test_config_validation() {
    let bad = NucleusConfig {
        cpus: 0,
        ..NucleusConfig::default()
    };
    assert!(Nucleus::new(bad).is_err());

    let nucleus = Nucleus::new(NucleusConfig::single_cpu()).unwrap();
    assert!(nucleus.spawn_thread(ThreadAttr::new(10).on_cpu(1)).is_err());
}
