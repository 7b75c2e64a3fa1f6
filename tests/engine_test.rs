mod common;

use anyhow::Result;
use uuid::Uuid;
use wallet_ledger::application::AppError;
use wallet_ledger::domain::{Operation, OperationKind};

use common::test_engine;

#[tokio::test]
async fn test_deposit_withdraw_scenario() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let w1 = Uuid::new_v4();

    engine.apply_operation(&Operation::deposit(w1, 1000)?).await?;
    assert_eq!(engine.get_balance(w1).await?, 1000);

    engine.apply_operation(&Operation::withdraw(w1, 500)?).await?;
    assert_eq!(engine.get_balance(w1).await?, 500);

    let err = engine
        .apply_operation(&Operation::withdraw(w1, 600)?)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::InsufficientFunds {
            balance: 500,
            requested: 600,
            ..
        }
    ));
    assert_eq!(engine.get_balance(w1).await?, 500);

    Ok(())
}

#[tokio::test]
async fn test_unknown_wallet_is_not_found() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let w2 = Uuid::new_v4();

    let err = engine.get_balance(w2).await.unwrap_err();
    assert_eq!(err, AppError::AccountNotFound(w2));

    // Querying must not create the wallet as a side effect.
    let err = engine.get_balance(w2).await.unwrap_err();
    assert_eq!(err, AppError::AccountNotFound(w2));
    assert!(matches!(
        engine.verify_account(w2).await,
        Err(AppError::AccountNotFound(_))
    ));

    Ok(())
}

#[tokio::test]
async fn test_first_deposit_creates_wallet() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let id = Uuid::new_v4();

    let entry = engine.apply_operation(&Operation::deposit(id, 250)?).await?;

    assert_eq!(entry.account_id, id);
    assert_eq!(entry.kind, OperationKind::Deposit);
    assert_eq!(entry.amount, 250);
    assert_eq!(entry.balance_after, 250);
    assert_eq!(engine.get_balance(id).await?, 250);

    Ok(())
}

#[tokio::test]
async fn test_withdraw_from_new_wallet_leaves_nothing_behind() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let id = Uuid::new_v4();

    let err = engine
        .apply_operation(&Operation::withdraw(id, 1)?)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientFunds { balance: 0, .. }));

    // The wallet bootstrap was rolled back with the rejected withdrawal.
    assert_eq!(
        engine.get_balance(id).await.unwrap_err(),
        AppError::AccountNotFound(id)
    );

    Ok(())
}

#[tokio::test]
async fn test_rejected_withdraw_adds_no_ledger_entry() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let id = Uuid::new_v4();

    engine.apply_operation(&Operation::deposit(id, 100)?).await?;
    let before = engine.verify_account(id).await?;

    assert!(engine.apply_operation(&Operation::withdraw(id, 101)?).await.is_err());

    let after = engine.verify_account(id).await?;
    assert_eq!(after.entry_count, before.entry_count);
    assert_eq!(after.stored_balance, 100);
    assert!(after.is_healthy());

    Ok(())
}

#[tokio::test]
async fn test_balance_equals_signed_sum_of_entries() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let id = Uuid::new_v4();

    let script: &[(OperationKind, i64)] = &[
        (OperationKind::Deposit, 500),
        (OperationKind::Withdraw, 120),
        (OperationKind::Deposit, 75),
        (OperationKind::Withdraw, 1000), // rejected
        (OperationKind::Withdraw, 455),
        (OperationKind::Deposit, 3),
    ];

    let mut expected = 0;
    let mut committed = 0;
    for (kind, amount) in script {
        match engine.apply_operation(&Operation::new(id, *kind, *amount)?).await {
            Ok(entry) => {
                expected += kind.signed(*amount);
                committed += 1;
                assert_eq!(entry.balance_after, expected);
            }
            Err(AppError::InsufficientFunds { .. }) => {}
            Err(e) => return Err(e.into()),
        }
    }

    assert_eq!(expected, 3);
    assert_eq!(engine.get_balance(id).await?, expected);

    let report = engine.verify_account(id).await?;
    assert_eq!(report.entry_count, committed);
    assert_eq!(report.replayed_balance, expected);
    assert!(report.is_healthy(), "{:?}", report.issues);

    Ok(())
}

#[tokio::test]
async fn test_withdraw_entire_balance() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let id = Uuid::new_v4();

    engine.apply_operation(&Operation::deposit(id, 42)?).await?;
    engine.apply_operation(&Operation::withdraw(id, 42)?).await?;

    assert_eq!(engine.get_balance(id).await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_deposit_overflow_is_rejected() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let id = Uuid::new_v4();

    engine.apply_operation(&Operation::deposit(id, i64::MAX)?).await?;
    let err = engine
        .apply_operation(&Operation::deposit(id, 1)?)
        .await
        .unwrap_err();

    assert_eq!(err, AppError::BalanceOverflow(id));
    assert_eq!(engine.get_balance(id).await?, i64::MAX);
    Ok(())
}

#[tokio::test]
async fn test_invalid_input_never_reaches_the_engine() {
    let id = Uuid::new_v4();

    let err: AppError = Operation::parse(id, "TRANSFER", 10).unwrap_err().into();
    assert_eq!(err, AppError::InvalidOperationKind("TRANSFER".into()));

    let err: AppError = Operation::deposit(id, 0).unwrap_err().into();
    assert_eq!(err, AppError::InvalidAmount(0));

    let err: AppError = Operation::withdraw(id, -10).unwrap_err().into();
    assert_eq!(err, AppError::InvalidAmount(-10));
}

#[tokio::test]
async fn test_wallets_are_independent() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    engine.apply_operation(&Operation::deposit(a, 100)?).await?;
    engine.apply_operation(&Operation::deposit(b, 900)?).await?;
    engine.apply_operation(&Operation::withdraw(b, 400)?).await?;

    assert_eq!(engine.get_balance(a).await?, 100);
    assert_eq!(engine.get_balance(b).await?, 500);
    Ok(())
}
