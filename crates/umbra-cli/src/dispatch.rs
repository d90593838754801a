use umbra_accountant::commands::alias::{AliasListOptions, AliasSetOptions};
use umbra_accountant::commands::expense::{ExpenseAddOptions, ExpenseImportOptions, ExpenseListOptions};
use umbra_accountant::commands::fx::{FxListOptions, FxSetOptions};
use umbra_accountant::commands::link::{LinkListOptions, LinkReleaseOptions, LinkShowOptions};
use umbra_accountant::commands::reconcile::ReconcileOptions;
use umbra_accountant::commands::review::{ReviewDecideOptions, ReviewListOptions};
use umbra_accountant::commands::statement::{StatementImportOptions, StatementListOptions};
use umbra_accountant::commands::{alias, expense, fx, link, reconcile, review, statement};
use umbra_accountant::{ClientResult, SuccessEnvelope};

use crate::cli::{
    AliasCommand, Cli, Commands, ExpenseCommand, FxCommand, IsoDate, LinkCommand, ReviewCommand,
    StatementCommand,
};

pub fn dispatch(cli: &Cli) -> ClientResult<SuccessEnvelope> {
    let home_override = cli.home.as_deref();
    match &cli.command {
        Commands::Statement { command } => match command {
            StatementCommand::Import {
                path,
                user_id,
                account_ref,
                statement_ref,
            } => statement::import_with_options(StatementImportOptions {
                path: path.clone(),
                user_id: user_id.clone(),
                account_ref: account_ref.clone(),
                statement_ref: statement_ref.clone(),
                home_override,
                stdin_override: None,
            }),
            StatementCommand::List { user_id } => {
                statement::list_with_options(StatementListOptions {
                    user_id: user_id.clone(),
                    home_override,
                })
            }
        },
        Commands::Expense { command } => match command {
            ExpenseCommand::Add {
                user_id,
                date,
                amount,
                currency,
                merchant,
                category,
                source,
                credit,
                vat_breakdown,
            } => expense::add_with_options(ExpenseAddOptions {
                user_id: user_id.clone(),
                date: date.as_str().to_string(),
                amount: amount.clone(),
                currency: currency.clone(),
                merchant: merchant.clone(),
                category: category.clone(),
                source: source.clone(),
                credit: *credit,
                vat_breakdown: vat_breakdown.clone(),
                home_override,
            }),
            ExpenseCommand::Import { path } => expense::import_with_options(ExpenseImportOptions {
                path: path.clone(),
                home_override,
                stdin_override: None,
            }),
            ExpenseCommand::List { user_id, from, to } => {
                expense::list_with_options(ExpenseListOptions {
                    user_id: user_id.clone(),
                    from: owned_date(from.as_ref()),
                    to: owned_date(to.as_ref()),
                    home_override,
                })
            }
        },
        Commands::Fx { command } => match command {
            FxCommand::Set {
                base,
                quote,
                date,
                rate,
                source,
            } => fx::set_with_options(FxSetOptions {
                base: base.clone(),
                quote: quote.clone(),
                as_of: date.as_str().to_string(),
                rate: rate.clone(),
                source: source.clone(),
                home_override,
            }),
            FxCommand::List => fx::list_with_options(FxListOptions { home_override }),
        },
        Commands::Alias { command } => match command {
            AliasCommand::Set { alias, canonical } => alias::set_with_options(AliasSetOptions {
                alias: alias.clone(),
                canonical: canonical.clone(),
                home_override,
            }),
            AliasCommand::List => alias::list_with_options(AliasListOptions { home_override }),
        },
        Commands::Reconcile {
            user_id,
            from,
            to,
            threshold,
            review_floor,
            window_days,
        } => reconcile::run_with_options(ReconcileOptions {
            user_id: user_id.clone(),
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
            threshold: *threshold,
            review_floor: *review_floor,
            window_days: *window_days,
            home_override,
            cancel: None,
        }),
        Commands::Review { command } => match command {
            ReviewCommand::List { user_id } => review::pending_with_options(ReviewListOptions {
                user_id: user_id.clone(),
                home_override,
            }),
            ReviewCommand::Decide {
                entry_id,
                decision,
                transaction_id,
                actor,
            } => review::decide_with_options(ReviewDecideOptions {
                entry_id: entry_id.clone(),
                action: decision.clone(),
                transaction_id: transaction_id.clone(),
                actor: actor.clone(),
                home_override,
            }),
        },
        Commands::Link { command } => match command {
            LinkCommand::Release { link_id, actor } => {
                link::release_with_options(LinkReleaseOptions {
                    link_id: link_id.clone(),
                    actor: actor.clone(),
                    home_override,
                })
            }
            LinkCommand::Show {
                expense_id,
                transaction_id,
            } => link::show_with_options(LinkShowOptions {
                expense_id: expense_id.clone(),
                transaction_id: transaction_id.clone(),
                home_override,
            }),
            LinkCommand::List { user_id, all } => link::list_with_options(LinkListOptions {
                user_id: user_id.clone(),
                include_inactive: *all,
                home_override,
            }),
        },
    }
}

fn owned_date(value: Option<&IsoDate>) -> Option<String> {
    value.map(|date| date.as_str().to_string())
}
