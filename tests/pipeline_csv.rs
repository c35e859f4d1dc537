use sales_insights::config::PipelineConfig;
use sales_insights::melt::coerce_amount;
use sales_insights::pipeline::{process_file, PipelineError};
use sales_insights::table_io::{read_table, LoadError};
use std::path::PathBuf;

const LEDGER: &str = "\
SalesLevel1,SalesLevel2,CustomerName,PartnerName,Program,InternalBusinessEntityName,InternalSubBusinessEntityName,SKU, 2024-03-01 ,2024-01-01,2024-02-01,Notes
Americas,West,Acme,P1,UNKNOWN,Networking,Switching,S3,60,5,,a
Americas,West,Acme,P1,EA 3.0,Networking,Switching,S2,,,10,b
Americas,West,Acme,P1,EA 3.0,Networking,Switching,S1,30,100,n/a,c
Americas,West,Acme,P1,UNKNOWN,Networking,Switching,S1,50,,,d
Americas,East,Beta,P2,UNKNOWN,Security,Firewall,S9,7,8,9,e
";

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("sales_insights_it_{}_{}", std::process::id(), name))
}

fn column_values(table: &sales_insights::WideTable, name: &str) -> Vec<f64> {
    let index = table
        .columns
        .iter()
        .position(|c| c == name)
        .expect("output column present");
    (0..table.height())
        .map(|row| coerce_amount(table.cell(row, index)))
        .collect()
}

#[test]
fn test_csv_ledger_end_to_end() {
    let input = temp_path("ledger.csv");
    let output = temp_path("processed.csv");
    std::fs::write(&input, LEDGER).unwrap();

    let config = PipelineConfig::default();
    let metadata = process_file(&input, &output, None, &config).unwrap();

    assert_eq!(metadata.record_counts.wide_rows, 5);
    assert_eq!(metadata.record_counts.period_columns, 3);
    assert_eq!(metadata.record_counts.long_records, 15);
    assert_eq!(metadata.record_counts.coarse_rows_stamped, 1);
    assert_eq!(metadata.unparsed_headers, vec!["Notes".to_string()]);

    // Groups with nothing after the trigger are written as 0, never -0.
    assert!(!std::fs::read_to_string(&output).unwrap().contains(",-0"));

    let written = read_table(&output, None).unwrap();
    assert_eq!(written.height(), 5);
    // Original columns first, output columns appended in order.
    assert_eq!(written.columns[..12].to_vec(), {
        let mut headers: Vec<String> = LEDGER.lines().next().unwrap().split(',').map(|h| h.trim().to_string()).collect();
        headers.truncate(12);
        headers
    });
    assert_eq!(written.columns[12..].to_vec(), config.output.names().map(String::from).to_vec());
    assert_eq!(written.cell(2, 10), Some("n/a"));

    // S1: first trigger 100 on 01-01, later trigger 30 on 03-01, later follow-on 50 on 03-01.
    assert_eq!(
        column_values(&written, "Calculated First EA Amount (SKU)"),
        vec![0.0, 10.0, 100.0, 0.0, 0.0]
    );
    assert_eq!(
        column_values(&written, "Calculated Total EA After First (SKU)"),
        vec![0.0, 0.0, 30.0, 0.0, 0.0]
    );
    assert_eq!(
        column_values(&written, "Calculated Total UNKNOWN After First EA (SKU)"),
        vec![0.0, 0.0, 50.0, 0.0, 0.0]
    );
    // Acme/P1 earliest trigger is 01-01: follow-on after it is 60 + 50, stamped on row 1 only.
    assert_eq!(
        column_values(&written, "Calculated Total UNKNOWN After First EA (Cust/Partner)"),
        vec![0.0, 110.0, 0.0, 0.0, 0.0]
    );

    // Processing the output again reproduces the same figures.
    let rerun = temp_path("processed_again.csv");
    process_file(&output, &rerun, None, &config).unwrap();
    let again = read_table(&rerun, None).unwrap();
    assert_eq!(again.columns, written.columns);
    for name in config.output.names() {
        assert_eq!(column_values(&again, name), column_values(&written, name));
    }

    for path in [input, output, rerun] {
        std::fs::remove_file(path).ok();
    }
}

#[test]
fn test_csv_ledger_to_workbook() {
    let input = temp_path("ledger_for_xlsx.csv");
    let output = temp_path("processed.xlsx");
    std::fs::write(&input, LEDGER).unwrap();

    let config = PipelineConfig::default();
    process_file(&input, &output, None, &config).unwrap();

    let written = read_table(&output, None).unwrap();
    assert_eq!(written.height(), 5);
    assert_eq!(written.cell(2, 4), Some("EA 3.0"));
    assert_eq!(written.cell(2, 10), Some("n/a"));
    assert_eq!(
        column_values(&written, "Calculated Total UNKNOWN After First EA (SKU)"),
        vec![0.0, 0.0, 50.0, 0.0, 0.0]
    );
    assert_eq!(
        column_values(&written, "Calculated Total UNKNOWN After First EA (Cust/Partner)"),
        vec![0.0, 110.0, 0.0, 0.0, 0.0]
    );

    for path in [input, output] {
        std::fs::remove_file(path).ok();
    }
}

#[test]
fn test_missing_input_is_load_error() {
    let err = process_file(
        &temp_path("absent.csv"),
        &temp_path("never.csv"),
        None,
        &PipelineConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::Load(LoadError::NotFound(_))));
}
