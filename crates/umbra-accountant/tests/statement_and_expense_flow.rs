mod support;

use serde_json::Value;
use support::ledger_testkit::{
    ACCOUNT, USER, add_expense, add_expense_result, error_code, import_statement_result, payload,
    query_count, set_fx, temp_home, write_file,
};
use umbra_accountant::commands::expense::{self, ExpenseImportOptions, ExpenseListOptions};
use umbra_accountant::commands::fx::{self, FxListOptions, FxSetOptions};
use umbra_accountant::commands::statement::{self, StatementImportOptions, StatementListOptions};

const SEPTEMBER_JSON: &str = r#"[
  {"posted_date": "2024-09-14", "amount": "-27.50", "currency": "CHF", "counterparty_text": "MIGROS ZUERICH", "mcc": "5411"},
  {"posted_date": "2024-09-20", "amount": "-64.90", "currency": "CHF", "counterparty_text": "COOP PRONTO BERN"}
]"#;

fn live_transactions(home: &std::path::Path) -> i64 {
    query_count(
        home,
        "SELECT COUNT(*) FROM internal_transactions WHERE voided_at IS NULL",
    )
}

#[test]
fn statement_import_reports_summary_and_next_step() {
    let temp = temp_home("umbra-statement-import");
    assert!(temp.is_ok());
    if let Ok((_temp, home)) = temp {
        let value = payload(import_statement_result(
            &home,
            USER,
            ACCOUNT,
            Some("2024-09"),
            SEPTEMBER_JSON,
        ));
        assert_eq!(value["ok"], true);
        assert_eq!(value["command"], "statement import");
        let data = &value["data"];
        assert_eq!(data["source_kind"], "stdin");
        assert_eq!(data["statement_ref"], "2024-09");
        assert_eq!(data["summary"]["rows_read"], 2);
        assert_eq!(data["summary"]["rows_valid"], 2);
        assert_eq!(data["summary"]["rows_invalid"], 0);
        assert_eq!(data["summary"]["inserted"], 2);
        assert!(
            data["next_step"]["command"]
                .as_str()
                .unwrap_or_default()
                .starts_with("umbra reconcile --user u_anna")
        );
        assert_eq!(live_transactions(&home), 2);
        assert_eq!(
            query_count(
                &home,
                "SELECT COUNT(*) FROM internal_transactions WHERE amount = -2750 AND mcc = '5411'"
            ),
            1
        );
    }
}

#[test]
fn reimporting_a_statement_ref_voids_the_earlier_rows() {
    let temp = temp_home("umbra-statement-reimport");
    assert!(temp.is_ok());
    if let Ok((_temp, home)) = temp {
        let first = payload(import_statement_result(
            &home,
            USER,
            ACCOUNT,
            Some("2024-09"),
            SEPTEMBER_JSON,
        ));
        let first_id = first["data"]["statement_id"].clone();

        let corrected = r#"[
          {"posted_date": "2024-09-14", "amount": "-27.50", "currency": "CHF", "counterparty_text": "MIGROS ZUERICH"}
        ]"#;
        let second = payload(import_statement_result(
            &home,
            USER,
            ACCOUNT,
            Some("2024-09"),
            corrected,
        ));
        assert_eq!(second["data"]["voided_statement_ids"][0], first_id);
        assert_eq!(second["data"]["voided_transactions"], 2);
        assert_eq!(live_transactions(&home), 1);
        assert_eq!(
            query_count(&home, "SELECT COUNT(*) FROM internal_transactions"),
            3
        );

        let listed = payload(statement::list_with_options(StatementListOptions {
            user_id: USER.to_string(),
            home_override: Some(&home),
        }));
        let statements = listed["data"]["statements"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        assert_eq!(statements.len(), 2);
        for listed_statement in &statements {
            let is_first = listed_statement["statement_id"] == first_id;
            assert_eq!(listed_statement["voided_at"].is_null(), !is_first);
        }
    }
}

#[test]
fn account_owned_by_another_user_is_refused() {
    let temp = temp_home("umbra-statement-owner");
    assert!(temp.is_ok());
    if let Ok((_temp, home)) = temp {
        payload(import_statement_result(&home, USER, ACCOUNT, None, SEPTEMBER_JSON));
        let result = import_statement_result(&home, "u_beat", ACCOUNT, None, SEPTEMBER_JSON);
        assert!(result.is_err());
        if let Err(error) = result {
            assert_eq!(error.code, "account_owner_mismatch");
            let data = error.data.unwrap_or_default();
            assert_eq!(data["owner"], USER);
        }
        assert_eq!(live_transactions(&home), 2);
    }
}

#[test]
fn one_invalid_row_writes_nothing() {
    let temp = temp_home("umbra-statement-invalid");
    assert!(temp.is_ok());
    if let Ok((_temp, home)) = temp {
        let body = r#"[
          {"posted_date": "2024-09-14", "amount": "-27.50", "currency": "CHF"},
          {"posted_date": "14.09.2024", "amount": "-1.005", "currency": "CHF"}
        ]"#;
        let result = import_statement_result(&home, USER, ACCOUNT, None, body);
        assert!(result.is_err());
        if let Err(error) = result {
            assert_eq!(error.code, "statement_validation_failed");
            let data = error.data.unwrap_or_default();
            assert_eq!(data["summary"]["rows_read"], 2);
            assert_eq!(data["summary"]["rows_invalid"], 1);
            assert_eq!(data["summary"]["inserted"], 0);
            let issues = data["issues"].as_array().cloned().unwrap_or_default();
            assert!(issues.iter().all(|issue| issue["row"] == 2));
            let codes = issues
                .iter()
                .filter_map(|issue| issue["code"].as_str().map(str::to_string))
                .collect::<Vec<String>>();
            assert!(codes.contains(&"invalid_date".to_string()));
            assert!(codes.contains(&"invalid_amount_scale".to_string()));
        }
        assert_eq!(query_count(&home, "SELECT COUNT(*) FROM internal_statements"), 0);
        assert_eq!(query_count(&home, "SELECT COUNT(*) FROM internal_transactions"), 0);
    }
}

#[test]
fn csv_statement_file_is_imported_and_unknown_headers_are_refused() {
    let temp = temp_home("umbra-statement-csv");
    assert!(temp.is_ok());
    if let Ok((temp_dir, home)) = temp {
        let path = temp_dir.path().join("september.csv");
        write_file(
            &path,
            "posted_date,amount,currency,counterparty_text\n\
             2024-09-14,-27.50,CHF,MIGROS ZUERICH\n\
             2024-09-20,-64.90,CHF,COOP PRONTO BERN\n",
        );
        let value = payload(statement::import_with_options(StatementImportOptions {
            path: Some(path.display().to_string()),
            user_id: USER.to_string(),
            account_ref: ACCOUNT.to_string(),
            home_override: Some(&home),
            ..StatementImportOptions::default()
        }));
        assert_eq!(value["data"]["source_kind"], "file");
        assert_eq!(
            value["data"]["source_ref"],
            Value::String(path.display().to_string())
        );
        assert_eq!(value["data"]["summary"]["inserted"], 2);

        let stray = temp_dir.path().join("stray.csv");
        write_file(&stray, "posted_date,amount,currency,balance\n2024-09-14,-1.00,CHF,10\n");
        let result = statement::import_with_options(StatementImportOptions {
            path: Some(stray.display().to_string()),
            user_id: USER.to_string(),
            account_ref: ACCOUNT.to_string(),
            home_override: Some(&home),
            ..StatementImportOptions::default()
        });
        assert!(result.is_err());
        if let Err(error) = result {
            assert_eq!(error.code, "invalid_import_format");
            let data = error.data.unwrap_or_default();
            assert_eq!(data["actual_headers"][3], "balance");
        }
        assert_eq!(live_transactions(&home), 2);
    }
}

#[test]
fn expense_import_from_stdin_records_every_row() {
    let temp = temp_home("umbra-expense-import");
    assert!(temp.is_ok());
    if let Ok((_temp, home)) = temp {
        let body = "user_id,date_local,amount,currency,merchant_text,source\n\
                    u_anna,2024-09-14,27.50,CHF,Migros,ocr\n\
                    u_anna,2024-09-20,64.90,CHF,Coop,manual\n";
        let value = payload(expense::import_with_options(ExpenseImportOptions {
            path: Some("-".to_string()),
            home_override: Some(&home),
            stdin_override: Some(body.to_string()),
        }));
        assert_eq!(value["data"]["source_kind"], "stdin");
        assert_eq!(value["data"]["summary"]["inserted"], 2);
        assert_eq!(
            value["data"]["expense_ids"]
                .as_array()
                .map(Vec::len)
                .unwrap_or_default(),
            2
        );

        let listed = payload(expense::list_with_options(ExpenseListOptions {
            user_id: USER.to_string(),
            from: Some("2024-09-01".to_string()),
            to: Some("2024-09-15".to_string()),
            home_override: Some(&home),
        }));
        let rows = listed["data"]["rows"].as_array().cloned().unwrap_or_default();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["amount_cents"], 2750);
        assert_eq!(rows[0]["source"], "ocr");
        assert_eq!(rows[0]["direction"], "debit");
        assert!(rows[0]["active_link_id"].is_null());
    }
}

#[test]
fn expense_add_validates_fields_and_list_checks_the_period() {
    let temp = temp_home("umbra-expense-add");
    assert!(temp.is_ok());
    if let Ok((_temp, home)) = temp {
        assert_eq!(
            error_code(add_expense_result(&home, "2024-09-14", "-5.00", "CHF", "Migros")),
            "expense_validation_failed"
        );
        assert_eq!(
            error_code(add_expense_result(&home, "2024-09-14", "5.00", "CHFX", "Migros")),
            "expense_validation_failed"
        );
        assert_eq!(query_count(&home, "SELECT COUNT(*) FROM internal_expenses"), 0);

        let expense_id = add_expense(&home, "2024-09-14", "5.00", "chf", "Migros");
        assert!(expense_id.starts_with("exp_"));
        assert_eq!(
            query_count(&home, "SELECT COUNT(*) FROM internal_expenses WHERE currency = 'CHF'"),
            1
        );

        let inverted = expense::list_with_options(ExpenseListOptions {
            user_id: USER.to_string(),
            from: Some("2024-09-30".to_string()),
            to: Some("2024-09-01".to_string()),
            home_override: Some(&home),
        });
        assert_eq!(error_code(inverted), "invalid_period");
    }
}

#[test]
fn fx_rates_upsert_and_list() {
    let temp = temp_home("umbra-fx");
    assert!(temp.is_ok());
    if let Ok((_temp, home)) = temp {
        set_fx(&home, "EUR", "CHF", "2024-09-13", "0.95");
        set_fx(&home, "EUR", "CHF", "2024-09-13", "0.9425");
        set_fx(&home, "USD", "CHF", "2024-09-13", "0.85");

        let listed = payload(fx::list_with_options(FxListOptions {
            home_override: Some(&home),
        }));
        let rates = listed["data"]["rates"].as_array().cloned().unwrap_or_default();
        assert_eq!(rates.len(), 2);
        let eur = rates.iter().find(|rate| rate["base"] == "EUR");
        assert!(eur.is_some());
        if let Some(eur) = eur {
            assert_eq!(eur["rate"], "0.9425");
            assert_eq!(eur["source"], "manual");
        }

        let same = fx::set_with_options(FxSetOptions {
            base: "CHF".to_string(),
            quote: "CHF".to_string(),
            as_of: "2024-09-13".to_string(),
            rate: "1".to_string(),
            home_override: Some(&home),
            ..FxSetOptions::default()
        });
        assert_eq!(error_code(same), "invalid_argument");

        let negative = fx::set_with_options(FxSetOptions {
            base: "EUR".to_string(),
            quote: "CHF".to_string(),
            as_of: "2024-09-13".to_string(),
            rate: "-0.9".to_string(),
            home_override: Some(&home),
            ..FxSetOptions::default()
        });
        assert_eq!(error_code(negative), "invalid_argument");
    }
}
