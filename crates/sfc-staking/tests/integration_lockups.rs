//! Integration tests for locking, relocking and early unlock penalties

mod common;

use common::*;
use sfc_core::prelude::*;
use sfc_staking::AccrualVersion;

const VERSIONS: [AccrualVersion; 2] = [AccrualVersion::Legacy, AccrualVersion::MultiLock];

mod penalty_tests {
    use super::*;

    /// Delegator locks 1 of 10 tokens on the third validator for 14 days
    /// and earns one 100-second epoch at 1 token per second
    fn locked_epoch(accrual: AccrualVersion) -> (Net, Address, ValidatorId) {
        let (mut net, [_, _, v3]) = three_validators(accrual);
        net.seal(1000);
        let delegator = net.delegate("delegator", v3, tokens(10));
        let id = net
            .sfc
            .lock_stake(delegator, v3, 14 * DAY, tokens(1), net.now)
            .unwrap();
        assert_eq!(id, 1);
        net.seal(100);
        assert_eq!(
            net.sfc.epoch_snapshot(4).unwrap().reward_per_token(v3),
            482_954_545_454_545_454
        );
        (net, delegator, v3)
    }

    #[test]
    fn test_unlock_whole_lockup() {
        for version in VERSIONS {
            let (mut net, delegator, v3) = locked_epoch(version);
            let burnt_before = net.sfc.accounting().total_burnt;
            let penalty = net
                .sfc
                .unlock_stake(delegator, v3, 1, tokens(1), net.now)
                .unwrap();
            assert_eq!(penalty, 85_410_180_572_851_805, "{version}");
            assert_eq!(net.sfc.stake_of(&delegator, v3), tokens(10) - penalty);
            assert_eq!(net.sfc.accounting().total_burnt, burnt_before + penalty);
            assert_eq!(net.sfc.locked_stake(&delegator, v3, net.now), 0);
            assert!(!net.sfc.is_locked_up(&delegator, v3, net.now));
            assert_eq!(net.sfc.lockup_pending_rewards(&delegator, v3, 1).unwrap(), 0);
        }
    }

    #[test]
    fn test_unlocked_lockup_record_kept() {
        for version in VERSIONS {
            let (mut net, delegator, v3) = locked_epoch(version);
            let before = net.sfc.lockup(&delegator, v3, 1).unwrap().clone();
            let pending = net.pending(&delegator, v3);
            let penalty = net
                .sfc
                .unlock_stake(delegator, v3, 1, tokens(1), net.now)
                .unwrap();

            let lockup = net.sfc.lockup(&delegator, v3, 1).unwrap();
            assert_eq!(lockup.locked_stake, 0, "{version}");
            assert_eq!(lockup.from_epoch, before.from_epoch);
            assert_eq!(lockup.end_time, before.end_time);
            assert_eq!(lockup.duration, before.duration);
            assert!(lockup.stash.is_zero());
            // unpaid lockup rewards now sit in the record stash
            assert_eq!(net.sfc.reward_stash(&delegator, v3).total(), pending);
            assert_eq!(net.pending(&delegator, v3), pending);
            assert_eq!(net.sfc.unlocked_stake(&delegator, v3, net.now), tokens(10) - penalty);
            assert_eq!(
                net.sfc.unlock_stake(delegator, v3, 1, tokens(1), net.now),
                Err(SfcError::NotLockedUp)
            );
        }
    }

    #[test]
    fn test_unlock_after_period_ended_and_stash_rewards() {
        let (mut net, [_, _, v3]) = three_validators(AccrualVersion::MultiLock);
        net.seal(1000);
        let delegator = net.delegate("delegator", v3, tokens(10));
        assert_eq!(net.sfc.unlocked_stake(&delegator, v3, net.now), tokens(10));
        assert_eq!(net.pending(&delegator, v3), 0);

        net.sfc
            .lock_stake(delegator, v3, 14 * DAY, tokens(1), net.now)
            .unwrap();
        assert_eq!(net.sfc.unlocked_stake(&delegator, v3, net.now), tokens(9));
        assert_eq!(net.sfc.lockup_pending_rewards(&delegator, v3, 1).unwrap(), 0);

        net.seal(14 * DAY);
        assert_eq!(net.sfc.unlocked_stake(&delegator, v3, net.now), tokens(9));
        let locked_pending = net.sfc.lockup_pending_rewards(&delegator, v3, 1).unwrap();
        let unlocked_pending = net.pending(&delegator, v3) - locked_pending;
        assert_eq!(locked_pending, amount("1909.394271481942710817"));
        assert_eq!(unlocked_pending, amount("15772.909090909090909088"));

        // step past the lockup end so no penalty is due
        net.advance(1);
        assert_eq!(
            net.sfc.unlock_stake(delegator, v3, 1, tokens(1), net.now),
            Ok(0)
        );
        assert_eq!(net.sfc.lockup_pending_rewards(&delegator, v3, 1).unwrap(), 0);
        assert_eq!(
            net.pending(&delegator, v3),
            locked_pending + unlocked_pending
        );
        assert_eq!(net.sfc.unlocked_stake(&delegator, v3, net.now), tokens(10));
    }

    #[test]
    fn test_unlock_in_halves() {
        for version in VERSIONS {
            let (mut net, delegator, v3) = locked_epoch(version);
            let first = net
                .sfc
                .unlock_stake(delegator, v3, 1, amount("0.5"), net.now)
                .unwrap();
            assert_eq!(first, 42_705_090_286_425_902);

            assert_eq!(
                net.sfc.unlock_stake(delegator, v3, 1, amount("0.51"), net.now),
                Err(SfcError::NotEnoughLockedStake)
            );

            let second = net
                .sfc
                .unlock_stake(delegator, v3, 1, amount("0.5"), net.now)
                .unwrap();
            assert_eq!(second, 42_705_090_286_425_903);
            assert_eq!(first + second, 85_410_180_572_851_805);
        }
    }

    #[test]
    fn test_small_unlock_penalty() {
        let (mut net, delegator, v3) = locked_epoch(AccrualVersion::MultiLock);
        let penalty = net
            .sfc
            .unlock_stake(delegator, v3, 1, amount("0.01"), net.now)
            .unwrap();
        assert_eq!(penalty, 854_101_805_728_517);

        let (mut net, delegator, v3) = locked_epoch(AccrualVersion::MultiLock);
        net.sfc
            .unlock_stake(delegator, v3, 1, amount("0.5"), net.now)
            .unwrap();
        let penalty = net
            .sfc
            .unlock_stake(delegator, v3, 1, amount("0.01"), net.now)
            .unwrap();
        assert_eq!(penalty, 854_101_805_728_517);
    }

    #[test]
    fn test_failed_unlock_changes_nothing() {
        let (mut net, delegator, v3) = locked_epoch(AccrualVersion::MultiLock);
        let before = net.sfc.state().clone();
        assert_eq!(
            net.sfc.unlock_stake(delegator, v3, 1, tokens(2), net.now),
            Err(SfcError::NotEnoughLockedStake)
        );
        assert_eq!(net.sfc.unlock_stake(delegator, v3, 1, 0, net.now), Err(SfcError::ZeroAmount));
        assert_eq!(
            net.sfc.unlock_stake(delegator, v3, 9, tokens(1), net.now),
            Err(SfcError::NotLockedUp)
        );
        assert_eq!(net.sfc.state(), &before);
    }

    #[test]
    fn test_no_penalty_after_lockup_end() {
        let (mut net, delegator, v3) = locked_epoch(AccrualVersion::MultiLock);
        net.advance(15 * DAY);
        let penalty = net
            .sfc
            .unlock_stake(delegator, v3, 1, tokens(1), net.now)
            .unwrap();
        assert_eq!(penalty, 0);
        assert_eq!(net.sfc.stake_of(&delegator, v3), tokens(10));
    }
}

mod lock_tests {
    use super::*;

    #[test]
    fn test_lock_rejections() {
        for version in VERSIONS {
            let (mut net, [v1, _, v3]) = three_validators(version);
            let delegator = net.delegate("delegator", v3, tokens(10));
            let now = net.now;

            assert_eq!(
                net.sfc.lock_stake(delegator, v3, 14 * DAY, 0, now),
                Err(SfcError::ZeroAmount)
            );
            assert_eq!(
                net.sfc.lock_stake(delegator, v3, 13 * DAY, tokens(1), now),
                Err(SfcError::IncorrectDuration)
            );
            assert_eq!(
                net.sfc.lock_stake(delegator, v3, 366 * DAY, tokens(1), now),
                Err(SfcError::IncorrectDuration)
            );
            // third validator is locked for 364 days only
            assert_eq!(
                net.sfc.lock_stake(delegator, v3, 365 * DAY, tokens(1), now),
                Err(SfcError::ValidatorLockupEndsEarlier)
            );
            assert_eq!(
                net.sfc.lock_stake(delegator, v3, 14 * DAY, tokens(11), now),
                Err(SfcError::NotEnoughStake)
            );
            assert_eq!(
                net.sfc.lock_stake(delegator, 42, 14 * DAY, tokens(1), now),
                Err(SfcError::ValidatorNotFound(42))
            );

            let auth1 = account("validator-1");
            assert_eq!(
                net.sfc.lock_stake(auth1, v1, 14 * DAY, tokens(10_000), now),
                Err(SfcError::NotEnoughStake)
            );
            assert_eq!(net.sfc.lock_stake(auth1, v1, 14 * DAY, tokens(10), now), Ok(1));
        }
    }

    #[test]
    fn test_delegator_cannot_outlast_unlocked_validator() {
        let (mut net, [v1, _, _]) = three_validators(AccrualVersion::MultiLock);
        let delegator = net.delegate("delegator", v1, tokens(10));
        assert_eq!(
            net.sfc.lock_stake(delegator, v1, 14 * DAY, tokens(1), net.now),
            Err(SfcError::ValidatorLockupEndsEarlier)
        );
    }

    #[test]
    fn test_multilock_allocates_ids() {
        let (mut net, [_, _, v3]) = three_validators(AccrualVersion::MultiLock);
        let delegator = net.delegate("delegator", v3, tokens(10));
        let now = net.now;
        assert_eq!(net.sfc.lock_stake(delegator, v3, 14 * DAY, tokens(1), now), Ok(1));
        assert_eq!(net.sfc.lock_stake(delegator, v3, 30 * DAY, tokens(2), now), Ok(2));
        assert_eq!(net.sfc.locked_stake(&delegator, v3, now), tokens(3));
        assert_eq!(net.sfc.unlocked_stake(&delegator, v3, now), tokens(7));
    }

    #[test]
    fn test_legacy_single_lockup() {
        let (mut net, [_, _, v3]) = three_validators(AccrualVersion::Legacy);
        let delegator = net.delegate("delegator", v3, tokens(10));
        let now = net.now;
        assert_eq!(net.sfc.lock_stake(delegator, v3, 14 * DAY, tokens(1), now), Ok(1));
        assert_eq!(
            net.sfc.lock_stake(delegator, v3, 30 * DAY, tokens(1), now),
            Err(SfcError::AlreadyLockedUp(1))
        );
    }

    #[test]
    fn test_legacy_lockup_released_on_expiry() {
        let (mut net, [_, _, v3]) = three_validators(AccrualVersion::Legacy);
        let delegator = net.delegate("delegator", v3, tokens(10));
        net.sfc
            .lock_stake(delegator, v3, 14 * DAY, tokens(1), net.now)
            .unwrap();
        net.seal(DAY);
        net.seal(14 * DAY);

        assert_eq!(net.sfc.locked_stake(&delegator, v3, net.now), 0);
        assert_eq!(
            net.sfc.unlock_stake(delegator, v3, 1, tokens(1), net.now),
            Err(SfcError::NotLockedUp)
        );

        let pending = net.pending(&delegator, v3);
        net.sfc.stash_rewards(delegator, v3, net.now).unwrap();
        let released = net.sfc.lockup(&delegator, v3, 1).unwrap();
        assert_eq!(released.locked_stake, 0);
        assert!(released.stash.is_zero());
        assert_eq!(net.pending(&delegator, v3), pending);

        // slot is free again
        assert_eq!(
            net.sfc.lock_stake(delegator, v3, 14 * DAY, tokens(1), net.now),
            Ok(1)
        );
    }

    #[test]
    fn test_multilock_keeps_expired_stake_locked() {
        let (mut net, [_, _, v3]) = three_validators(AccrualVersion::MultiLock);
        let delegator = net.delegate("delegator", v3, tokens(10));
        net.sfc
            .lock_stake(delegator, v3, 14 * DAY, tokens(1), net.now)
            .unwrap();
        net.advance(20 * DAY);
        assert_eq!(net.sfc.locked_stake(&delegator, v3, net.now), tokens(1));
        assert!(!net.sfc.is_locked_up(&delegator, v3, net.now));
    }
}

mod relock_tests {
    use super::*;

    #[test]
    fn test_relock_adds_and_restarts() {
        for version in VERSIONS {
            let (mut net, [_, _, v3]) = three_validators(version);
            let delegator = net.delegate("delegator", v3, tokens(10));
            net.sfc
                .lock_stake(delegator, v3, 14 * DAY, tokens(1), net.now)
                .unwrap();
            net.advance(DAY);
            net.sfc
                .relock_stake(delegator, v3, 1, 20 * DAY, tokens(2), net.now)
                .unwrap();

            let lockup = net.sfc.lockup(&delegator, v3, 1).unwrap();
            assert_eq!(lockup.locked_stake, tokens(3));
            assert_eq!(lockup.start_time, net.now);
            assert_eq!(lockup.end_time, net.now + 20 * DAY);
            assert_eq!(lockup.duration, 20 * DAY);
            assert_eq!(lockup.from_epoch, net.sfc.current_epoch());
        }
    }

    #[test]
    fn test_relock_rejections() {
        let (mut net, [_, _, v3]) = three_validators(AccrualVersion::MultiLock);
        let delegator = net.delegate("delegator", v3, tokens(10));
        net.sfc
            .lock_stake(delegator, v3, 14 * DAY, tokens(1), net.now)
            .unwrap();
        let now = net.now;

        assert_eq!(
            net.sfc.relock_stake(delegator, v3, 1, 14 * DAY, 0, now),
            Err(SfcError::ZeroAmount)
        );
        assert_eq!(
            net.sfc.relock_stake(delegator, v3, 1, 400 * DAY, tokens(1), now),
            Err(SfcError::IncorrectDuration)
        );
        assert_eq!(
            net.sfc.relock_stake(delegator, v3, 1, 14 * DAY, tokens(10), now),
            Err(SfcError::NotEnoughStake)
        );
        assert_eq!(
            net.sfc.relock_stake(delegator, v3, 2, 14 * DAY, tokens(1), now),
            Err(SfcError::NotLockedUp)
        );
        assert_eq!(
            net.sfc.relock_stake(delegator, v3, 1, 365 * DAY, tokens(1), now),
            Err(SfcError::ValidatorLockupEndsEarlier)
        );
    }

    #[test]
    fn test_legacy_relock_duration_cannot_shrink() {
        let (mut net, [_, _, v3]) = three_validators(AccrualVersion::Legacy);
        let delegator = net.delegate("delegator", v3, tokens(10));
        net.sfc
            .lock_stake(delegator, v3, 30 * DAY, tokens(1), net.now)
            .unwrap();
        assert_eq!(
            net.sfc.relock_stake(delegator, v3, 1, 20 * DAY, tokens(1), net.now),
            Err(SfcError::LockupDurationDecrease)
        );
        // zero amount extends the lockup only
        net.sfc
            .relock_stake(delegator, v3, 1, 40 * DAY, 0, net.now)
            .unwrap();
        assert_eq!(net.sfc.lockup(&delegator, v3, 1).unwrap().end_time, net.now + 40 * DAY);
    }
}
