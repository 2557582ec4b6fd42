//! Integration tests for validators, delegations, withdrawals, slashing,
//! genesis bootstrap and owner operations

mod common;

use common::*;
use sfc_core::prelude::*;
use sfc_staking::{AccrualVersion, DriverSignal, GenesisDelegation, GenesisLockup, GenesisValidator};

mod validator_tests {
    use super::*;

    #[test]
    fn test_min_self_stake() {
        let mut net = Net::new(AccrualVersion::MultiLock);
        assert_eq!(
            net.sfc
                .create_validator(account("short"), vec![1], amount("0.3174"), net.now),
            Err(SfcError::InsufficientSelfStake)
        );
        assert_eq!(
            net.sfc
                .create_validator(account("enough"), vec![1], amount("0.3175"), net.now),
            Ok(1)
        );
    }

    #[test]
    fn test_create_rejections() {
        let mut net = Net::new(AccrualVersion::MultiLock);
        let (auth, _) = net.create_validator("validator-a", tokens(1));
        assert_eq!(
            net.sfc.create_validator(auth, vec![1], tokens(1), net.now),
            Err(SfcError::ValidatorExists)
        );
        assert_eq!(
            net.sfc
                .create_validator(account("validator-b"), vec![], tokens(1), net.now),
            Err(SfcError::EmptyPubkey)
        );
        assert_eq!(net.sfc.last_validator_id(), 1);
    }

    #[test]
    fn test_received_stake_sums_records() {
        let mut net = Net::new(AccrualVersion::MultiLock);
        let (auth, a) = net.create_validator("validator-a", tokens(10));
        net.delegate("d1", a, tokens(11));
        net.delegate("d2", a, tokens(8));
        net.delegate("d3", a, tokens(8));

        let validator = net.sfc.validator(a).unwrap();
        assert_eq!(validator.received_stake, tokens(37));
        assert_eq!(validator.auth, auth);
        assert_eq!(net.sfc.self_stake(a), tokens(10));
        assert_eq!(net.sfc.state().ledger.sum_of_records(a), tokens(37));
        assert_eq!(net.sfc.accounting().total_stake, tokens(37));
        assert_eq!(net.sfc.accounting().total_active_stake, tokens(37));
        assert_eq!(net.sfc.validator_id_of(&auth), Some(a));
    }

    #[test]
    fn test_delegation_limit() {
        let mut net = Net::new(AccrualVersion::MultiLock);
        let (_, a) = net.create_validator("validator-a", tokens(1));
        net.delegate("d1", a, tokens(15));
        assert_eq!(
            net.sfc.delegate(account("d2"), a, 1, net.now),
            Err(SfcError::DelegationsLimitExceeded)
        );
        assert_eq!(net.sfc.validator(a).unwrap().received_stake, tokens(16));
    }

    #[test]
    fn test_delegate_rejections() {
        let mut net = Net::new(AccrualVersion::MultiLock);
        let (_, a) = net.create_validator("validator-a", tokens(1));
        assert_eq!(
            net.sfc.delegate(account("d1"), a, 0, net.now),
            Err(SfcError::ZeroAmount)
        );
        assert_eq!(
            net.sfc.delegate(account("d1"), 9, tokens(1), net.now),
            Err(SfcError::ValidatorNotFound(9))
        );
    }
}

mod withdrawal_tests {
    use super::*;

    fn delegated() -> (Net, Address, ValidatorId) {
        let mut net = Net::new(AccrualVersion::MultiLock);
        let (_, a) = net.create_validator("validator-a", tokens(10));
        let delegator = net.delegate("delegator", a, tokens(5));
        net.seal(0);
        (net, delegator, a)
    }

    #[test]
    fn test_undelegate_then_withdraw() {
        let (mut net, delegator, a) = delegated();
        net.sfc.undelegate(delegator, a, 0, tokens(2), net.now).unwrap();
        assert_eq!(net.sfc.stake_of(&delegator, a), tokens(3));
        assert_eq!(net.sfc.validator(a).unwrap().received_stake, tokens(13));

        let request = net.sfc.withdrawal_request(&delegator, a, 0).unwrap();
        assert_eq!(request.amount, tokens(2));
        assert_eq!(request.epoch, net.sfc.current_epoch());

        assert_eq!(
            net.sfc.withdraw(delegator, a, 0, net.now),
            Err(SfcError::NotEnoughTimePassed)
        );
        net.advance(7 * DAY);
        assert_eq!(
            net.sfc.withdraw(delegator, a, 0, net.now),
            Err(SfcError::NotEnoughEpochsPassed)
        );

        net.seal(0);
        net.seal(0);
        net.seal(0);
        assert_eq!(net.sfc.withdraw(delegator, a, 0, net.now), Ok(tokens(2)));
        assert_eq!(net.sfc.balance_of(&delegator), tokens(2));
        assert_eq!(net.sfc.accounting().total_withdrawn, tokens(2));
        assert!(net.sfc.withdrawal_request(&delegator, a, 0).is_none());
        assert_eq!(
            net.sfc.withdraw(delegator, a, 0, net.now),
            Err(SfcError::RequestNotFound(0))
        );
    }

    #[test]
    fn test_undelegate_rejections() {
        let (mut net, delegator, a) = delegated();
        let now = net.now;
        assert_eq!(net.sfc.undelegate(delegator, a, 0, 0, now), Err(SfcError::ZeroAmount));
        assert_eq!(
            net.sfc.undelegate(delegator, a, 0, tokens(6), now),
            Err(SfcError::NotEnoughUnlockedStake)
        );
        net.sfc.undelegate(delegator, a, 0, tokens(1), now).unwrap();
        assert_eq!(
            net.sfc.undelegate(delegator, a, 0, tokens(1), now),
            Err(SfcError::RequestExists(0))
        );
    }

    #[test]
    fn test_locked_stake_cannot_be_undelegated() {
        let (mut net, [_, _, v3]) = three_validators(AccrualVersion::MultiLock);
        let delegator = net.delegate("delegator", v3, tokens(10));
        net.sfc
            .lock_stake(delegator, v3, 14 * DAY, tokens(4), net.now)
            .unwrap();
        assert_eq!(
            net.sfc.undelegate(delegator, v3, 0, tokens(7), net.now),
            Err(SfcError::NotEnoughUnlockedStake)
        );
        assert!(net.sfc.undelegate(delegator, v3, 0, tokens(6), net.now).is_ok());
    }

    #[test]
    fn test_self_stake_floor_rolls_back() {
        let mut net = Net::new(AccrualVersion::MultiLock);
        let (auth, a) = net.create_validator("validator-a", tokens(1));
        net.sfc.drain_signals();
        let before = net.sfc.state().clone();

        assert_eq!(
            net.sfc.undelegate(auth, a, 0, amount("0.9"), net.now),
            Err(SfcError::InsufficientSelfStake)
        );
        assert_eq!(net.sfc.state(), &before);
        assert!(net.sfc.drain_signals().is_empty());
    }

    #[test]
    fn test_self_undelegate_respects_delegation_limit() {
        let mut net = Net::new(AccrualVersion::MultiLock);
        let (auth, a) = net.create_validator("validator-a", tokens(1));
        net.delegate("d1", a, tokens(15));
        assert_eq!(
            net.sfc.undelegate(auth, a, 0, amount("0.1"), net.now),
            Err(SfcError::DelegationsLimitExceeded)
        );
    }

    #[test]
    fn test_full_self_undelegate_withdraws_validator() {
        let mut net = Net::new(AccrualVersion::MultiLock);
        let (auth, a) = net.create_validator("validator-a", tokens(1));
        net.create_validator("validator-b", tokens(1));
        let delegator = net.delegate("delegator", a, tokens(2));
        net.advance(10);
        net.sfc.drain_signals();

        net.sfc.undelegate(auth, a, 0, tokens(1), net.now).unwrap();
        let validator = net.sfc.validator(a).unwrap();
        assert_eq!(validator.status, ValidatorStatus::WITHDRAWN);
        assert_eq!(validator.deactivated_time, 10);
        assert_eq!(
            net.sfc.drain_signals(),
            vec![DriverSignal::ValidatorWeight {
                validator_id: a,
                weight: 0
            }]
        );
        assert_eq!(net.sfc.accounting().total_active_stake, tokens(1));

        assert_eq!(
            net.sfc.delegate(delegator, a, tokens(1), net.now),
            Err(SfcError::ValidatorNotActive(a))
        );
        assert_eq!(
            net.sfc.lock_stake(delegator, a, 14 * DAY, tokens(1), net.now),
            Err(SfcError::ValidatorNotActive(a))
        );
    }

    #[test]
    fn test_waiting_period_counts_from_deactivation() {
        let (mut net, delegator, a) = delegated();
        net.advance(DAY);
        net.sfc
            .deactivate_validator(&net.token, a, ValidatorStatus::OFFLINE.bits(), net.now)
            .unwrap();
        net.seal(7 * DAY);
        net.seal(0);
        net.seal(0);

        net.sfc.undelegate(delegator, a, 0, tokens(5), net.now).unwrap();
        assert_eq!(net.sfc.withdraw(delegator, a, 0, net.now), Ok(tokens(5)));
    }
}

mod slashing_tests {
    use super::*;

    /// Delegator's 5 tokens on a doublesigning validator, waiting period over
    fn slashed() -> (Net, Address, ValidatorId) {
        let mut net = Net::new(AccrualVersion::MultiLock);
        let (_, a) = net.create_validator("validator-a", tokens(10));
        net.create_validator("validator-b", tokens(10));
        let delegator = net.delegate("delegator", a, tokens(5));
        net.seal(0);
        net.advance(DAY);
        net.sfc
            .deactivate_validator(&net.token, a, ValidatorStatus::DOUBLESIGN.bits(), net.now)
            .unwrap();
        net.sfc.undelegate(delegator, a, 0, tokens(5), net.now).unwrap();
        net.seal(7 * DAY);
        net.seal(0);
        net.seal(0);
        (net, delegator, a)
    }

    #[test]
    fn test_fully_slashed_without_refund() {
        let (mut net, delegator, a) = slashed();
        assert!(net.sfc.is_slashed(a));
        assert_eq!(net.sfc.slashing_penalty(a, tokens(5)), tokens(5));
        assert_eq!(
            net.sfc.withdraw(delegator, a, 0, net.now),
            Err(SfcError::FullySlashed)
        );
        // the request survives the failed withdrawal
        assert!(net.sfc.withdrawal_request(&delegator, a, 0).is_some());
    }

    #[test]
    fn test_partial_refund() {
        let (mut net, delegator, a) = slashed();
        let owner = net.owner;
        net.sfc
            .update_slashing_refund_ratio(owner, a, UNIT / 2, net.now)
            .unwrap();
        assert_eq!(net.sfc.slashing_refund_ratio(a), UNIT / 2);

        let penalty = tokens(5) / 2 + 1;
        let paid = net.sfc.withdraw(delegator, a, 0, net.now).unwrap();
        assert_eq!(paid, tokens(5) - penalty);
        assert_eq!(net.sfc.accounting().total_slashed_stake, penalty);
    }

    #[test]
    fn test_full_refund() {
        let (mut net, delegator, a) = slashed();
        let owner = net.owner;
        net.sfc
            .update_slashing_refund_ratio(owner, a, UNIT, net.now)
            .unwrap();
        assert_eq!(net.sfc.withdraw(delegator, a, 0, net.now), Ok(tokens(5)));
    }

    #[test]
    fn test_refund_ratio_rejections() {
        let (mut net, _, a) = slashed();
        let owner = net.owner;
        assert_eq!(
            net.sfc.update_slashing_refund_ratio(owner, a, UNIT + 1, net.now),
            Err(SfcError::RatioTooLarge)
        );
        assert_eq!(
            net.sfc.update_slashing_refund_ratio(owner, 2, UNIT / 2, net.now),
            Err(SfcError::ValidatorNotSlashed(2))
        );
        assert_eq!(
            net.sfc
                .update_slashing_refund_ratio(account("stranger"), a, UNIT / 2, net.now),
            Err(SfcError::NotOwner)
        );
    }

    #[test]
    fn test_status_only_grows() {
        let (mut net, _, a) = slashed();
        assert_eq!(
            net.sfc
                .deactivate_validator(&net.token, a, ValidatorStatus::OFFLINE.bits(), net.now),
            Err(SfcError::StatusNotMoreSevere(a))
        );
        assert_eq!(
            net.sfc.deactivate_validator(&net.token, 2, 3, net.now),
            Err(SfcError::WrongStatus)
        );
        assert_eq!(
            net.sfc.deactivate_validator(&net.token, 2, 0, net.now),
            Err(SfcError::WrongStatus)
        );
    }
}

mod genesis_tests {
    use super::*;

    fn genesis_validator(id: ValidatorId, name: &str) -> GenesisValidator {
        GenesisValidator {
            auth: account(name),
            validator_id: id,
            pubkey: vec![0xc0, 0x04],
            status: ValidatorStatus::OK,
            created_epoch: 0,
            created_time: 0,
            deactivated_epoch: 0,
            deactivated_time: 0,
        }
    }

    #[test]
    fn test_genesis_validator() {
        let mut net = Net::new(AccrualVersion::MultiLock);
        net.sfc
            .set_genesis_validator(&net.token, genesis_validator(5, "g5"), 0)
            .unwrap();
        assert_eq!(net.sfc.last_validator_id(), 5);
        assert_eq!(net.sfc.validator_id_of(&account("g5")), Some(5));

        assert_eq!(
            net.sfc
                .set_genesis_validator(&net.token, genesis_validator(5, "other"), 0),
            Err(SfcError::ValidatorExists)
        );
        assert_eq!(
            net.sfc
                .set_genesis_validator(&net.token, genesis_validator(6, "g5"), 0),
            Err(SfcError::ValidatorExists)
        );
        assert_eq!(
            net.sfc
                .set_genesis_validator(&net.token, genesis_validator(0, "zero"), 0),
            Err(SfcError::ValidatorExists)
        );
        let mut empty = genesis_validator(7, "empty");
        empty.pubkey.clear();
        assert_eq!(
            net.sfc.set_genesis_validator(&net.token, empty, 0),
            Err(SfcError::EmptyPubkey)
        );

        let (_, next) = net.create_validator("validator-a", tokens(1));
        assert_eq!(next, 6);
    }

    #[test]
    fn test_genesis_delegation_with_lockup() {
        let mut net = Net::new(AccrualVersion::MultiLock);
        net.sfc
            .set_genesis_validator(&net.token, genesis_validator(1, "g1"), 0)
            .unwrap();
        net.sfc
            .set_genesis_delegation(
                &net.token,
                GenesisDelegation {
                    delegator: account("g1"),
                    validator_id: 1,
                    stake: tokens(10),
                    lockup: None,
                    rewards: 0,
                },
                0,
            )
            .unwrap();

        let holder = account("holder");
        net.sfc
            .set_genesis_delegation(
                &net.token,
                GenesisDelegation {
                    delegator: holder,
                    validator_id: 1,
                    stake: tokens(10),
                    lockup: Some(GenesisLockup {
                        locked_stake: tokens(3),
                        from_epoch: 0,
                        end_time: 100 * DAY,
                        duration: 100 * DAY,
                        early_unlock_penalty: tokens(1),
                    }),
                    rewards: 7,
                },
                0,
            )
            .unwrap();

        assert_eq!(net.sfc.stake_of(&holder, 1), tokens(10));
        assert_eq!(net.sfc.locked_stake(&holder, 1, 0), tokens(3));
        assert_eq!(net.sfc.reward_stash(&holder, 1).unlocked, 7);
        let lockup = net.sfc.lockup(&holder, 1, 1).unwrap();
        assert_eq!(lockup.start_time, 0);
        assert_eq!(lockup.end_time, 100 * DAY);

        let penalty = net.sfc.unlock_stake(holder, 1, 1, tokens(3), 0).unwrap();
        assert_eq!(penalty, tokens(1));
        assert_eq!(net.sfc.stake_of(&holder, 1), tokens(9));
    }

    #[test]
    fn test_genesis_lockup_exceeding_stake() {
        let mut net = Net::new(AccrualVersion::MultiLock);
        net.sfc
            .set_genesis_validator(&net.token, genesis_validator(1, "g1"), 0)
            .unwrap();
        let result = net.sfc.set_genesis_delegation(
            &net.token,
            GenesisDelegation {
                delegator: account("g1"),
                validator_id: 1,
                stake: tokens(1),
                lockup: Some(GenesisLockup {
                    locked_stake: tokens(2),
                    from_epoch: 0,
                    end_time: 100 * DAY,
                    duration: 100 * DAY,
                    early_unlock_penalty: 0,
                }),
                rewards: 0,
            },
            0,
        );
        assert_eq!(result, Err(SfcError::LockedExceedsStake));
        assert_eq!(net.sfc.validator(1).unwrap().received_stake, 0);
    }

    #[test]
    fn test_genesis_needs_driver() {
        let mut net = Net::new(AccrualVersion::MultiLock);
        let stranger = sfc_staking::DriverToken::generate();
        assert_eq!(
            net.sfc
                .set_genesis_validator(&stranger, genesis_validator(1, "g1"), 0),
            Err(SfcError::NotDriver)
        );
    }
}

mod owner_tests {
    use super::*;

    #[test]
    fn test_owner_operations() {
        let mut net = Net::new(AccrualVersion::MultiLock);
        let owner = net.owner;
        let stranger = account("stranger");

        assert_eq!(
            net.sfc
                .update_constants(stranger, |c| c.update_validator_commission(0)),
            Err(SfcError::NotOwner)
        );
        assert_eq!(
            net.sfc.transfer_ownership(stranger, stranger),
            Err(SfcError::NotOwner)
        );
        assert!(matches!(
            net.sfc.transfer_ownership(owner, Address::ZERO),
            Err(SfcError::InvalidAddress(_))
        ));

        net.sfc.transfer_ownership(owner, stranger).unwrap();
        assert_eq!(net.sfc.owner(), stranger);
        assert_eq!(
            net.sfc
                .update_constants(owner, |c| c.update_validator_commission(0)),
            Err(SfcError::NotOwner)
        );
        net.sfc
            .update_constants(stranger, |c| c.update_validator_commission(0))
            .unwrap();
        assert_eq!(net.sfc.constants().validator_commission(), 0);
    }

    #[test]
    fn test_failed_constants_update_keeps_old_values() {
        let mut net = Net::new(AccrualVersion::MultiLock);
        let owner = net.owner;
        let before = net.sfc.constants().clone();
        let result = net.sfc.update_constants(owner, |c| {
            c.update_validator_commission(UNIT / 10)?;
            Err(SfcError::RatioTooLarge)
        });
        assert_eq!(result, Err(SfcError::RatioTooLarge));
        assert_eq!(net.sfc.constants(), &before);
    }
}
