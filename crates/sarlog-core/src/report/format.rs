//! Text and delimited rendering of report tables.

use std::io::{self, Write};

use chrono::{TimeZone, Utc};

use crate::storage::{FileHeader, RecordTime};

use super::Table;

/// Label printed in the time column of average lines.
const AVERAGE_LABEL: &str = "Average:";
const TIME_WIDTH: usize = 11;
const ITEM_WIDTH: usize = 9;

/// Output flavour.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Aligned columns with a header line per table and average lines.
    #[default]
    Text,
    /// One `host;interval;timestamp;item;field;value` line per value, for
    /// spreadsheets and scripts. Averages are not printed.
    Delimited,
}

/// Renders tables for one data source (one host).
#[derive(Clone, Debug)]
pub struct Formatter {
    format: OutputFormat,
    host: String,
}

impl Formatter {
    pub fn new(format: OutputFormat, header: &FileHeader) -> Self {
        Self {
            format,
            host: header.host.nodename.clone(),
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// `Linux 6.1.0 (node)  10/19/2026  _x86_64_  (4 CPU)` followed by a
    /// blank line. Text output only.
    pub fn banner(&self, out: &mut dyn Write, header: &FileHeader) -> io::Result<()> {
        if self.format != OutputFormat::Text {
            return Ok(());
        }
        let host = &header.host;
        writeln!(
            out,
            "{} {} ({}) \t{:02}/{:02}/{} \t_{}_\t({} CPU)",
            if host.sysname.is_empty() { "Linux" } else { host.sysname.as_str() },
            host.release,
            host.nodename,
            header.month,
            header.day,
            1900 + header.year as u32,
            host.machine,
            header.counts.cpu_nr.max(1),
        )?;
        writeln!(out)
    }

    /// Prints the tables of one interval ending at `time`, `interval`
    /// seconds long.
    pub fn tables(
        &self,
        out: &mut dyn Write,
        time: &RecordTime,
        interval: u64,
        tables: &[Table],
    ) -> io::Result<()> {
        match self.format {
            OutputFormat::Text => {
                let label = time.clock();
                for table in tables {
                    write_text_table(out, &label, table)?;
                }
                Ok(())
            }
            OutputFormat::Delimited => {
                for table in tables {
                    self.write_delimited_table(out, time, interval, table)?;
                }
                Ok(())
            }
        }
    }

    /// Prints the averages of a continuous segment.
    pub fn averages(&self, out: &mut dyn Write, tables: &[Table]) -> io::Result<()> {
        if self.format != OutputFormat::Text {
            return Ok(());
        }
        for table in tables {
            write_text_table(out, AVERAGE_LABEL, table)?;
        }
        Ok(())
    }

    pub fn restart(&self, out: &mut dyn Write, time: &RecordTime) -> io::Result<()> {
        match self.format {
            OutputFormat::Text => {
                writeln!(out, "{:<w$}     LINUX RESTART", time.clock(), w = TIME_WIDTH)?;
                writeln!(out)
            }
            OutputFormat::Delimited => writeln!(
                out,
                "{};-1;{};LINUX-RESTART",
                self.host,
                utc_timestamp(time.epoch)
            ),
        }
    }

    pub fn comment(&self, out: &mut dyn Write, time: &RecordTime, text: &str) -> io::Result<()> {
        match self.format {
            OutputFormat::Text => {
                writeln!(out, "{:<w$}     COM {}", time.clock(), text, w = TIME_WIDTH)?;
                writeln!(out)
            }
            OutputFormat::Delimited => writeln!(
                out,
                "{};-1;{};COM {}",
                self.host,
                utc_timestamp(time.epoch),
                text
            ),
        }
    }

    fn write_delimited_table(
        &self,
        out: &mut dyn Write,
        time: &RecordTime,
        interval: u64,
        table: &Table,
    ) -> io::Result<()> {
        let timestamp = utc_timestamp(time.epoch);
        for row in &table.rows {
            let item = if row.item.is_empty() { "-" } else { row.item.as_str() };
            for (column, value) in table.columns.iter().zip(&row.values) {
                writeln!(
                    out,
                    "{};{};{};{};{};{:.*}",
                    self.host, interval, timestamp, item, column.name, column.decimals, value
                )?;
            }
        }
        Ok(())
    }
}

fn column_width(name: &str) -> usize {
    name.len().max(ITEM_WIDTH)
}

fn write_text_table(out: &mut dyn Write, label: &str, table: &Table) -> io::Result<()> {
    let has_item = !table.item_label.is_empty();

    write!(out, "{:<w$}", label, w = TIME_WIDTH)?;
    if has_item {
        write!(out, " {:>w$}", table.item_label, w = ITEM_WIDTH)?;
    }
    for column in &table.columns {
        write!(out, " {:>w$}", column.name, w = column_width(&column.name))?;
    }
    writeln!(out)?;

    for row in &table.rows {
        write!(out, "{:<w$}", label, w = TIME_WIDTH)?;
        if has_item {
            write!(out, " {:>w$}", row.item, w = ITEM_WIDTH)?;
        }
        for (column, value) in table.columns.iter().zip(&row.values) {
            write!(
                out,
                " {:>w$.d$}",
                value,
                w = column_width(&column.name),
                d = column.decimals
            )?;
        }
        writeln!(out)?;
    }
    writeln!(out)
}

/// `2026-10-19 14:03:00 UTC`
fn utc_timestamp(epoch: i64) -> String {
    match Utc.timestamp_opt(epoch, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => epoch.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{Column, Row, TableKind};
    use crate::storage::{Activities, DomainCounts};
    use crate::util::HostIdentity;

    fn header() -> FileHeader {
        let mut header = FileHeader::new(
            Activities::ALL,
            DomainCounts {
                cpu_nr: 4,
                ..Default::default()
            },
            100,
            HostIdentity {
                sysname: "Linux".into(),
                release: "6.1.0".into(),
                nodename: "db1".into(),
                machine: "x86_64".into(),
            },
            0,
        );
        header.day = 19;
        header.month = 10;
        header.year = 126;
        header
    }

    fn table() -> Table {
        Table {
            name: "cpu",
            item_label: "CPU",
            kind: TableKind::Rate,
            columns: vec![Column::new("%user", 2), Column::new("%idle", 2)],
            rows: vec![Row {
                item: "all".into(),
                values: vec![10.0, 90.0],
            }],
        }
    }

    fn time() -> RecordTime {
        RecordTime {
            epoch: 1_700_000_000,
            hour: 12,
            minute: 0,
            second: 5,
        }
    }

    fn render(f: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_banner() {
        let h = header();
        let fmt = Formatter::new(OutputFormat::Text, &h);
        let text = render(|out| fmt.banner(out, &h));
        assert_eq!(text, "Linux 6.1.0 (db1) \t10/19/2026 \t_x86_64_\t(4 CPU)\n\n");

        let delimited = Formatter::new(OutputFormat::Delimited, &h);
        assert_eq!(render(|out| delimited.banner(out, &h)), "");
    }

    #[test]
    fn test_text_table() {
        let fmt = Formatter::new(OutputFormat::Text, &header());
        let text = render(|out| fmt.tables(out, &time(), 1, &[table()]));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("12:00:05"));
        assert!(lines[0].ends_with("CPU     %user     %idle"));
        assert!(lines[1].ends_with("all     10.00     90.00"));
        assert_eq!(lines[2], "");

        let avg = render(|out| fmt.averages(out, &[table()]));
        assert!(avg.lines().nth(1).unwrap().starts_with("Average:"));
    }

    #[test]
    fn test_delimited_rows() {
        let fmt = Formatter::new(OutputFormat::Delimited, &header());
        let text = render(|out| fmt.tables(out, &time(), 2, &[table()]));
        assert_eq!(
            text,
            "db1;2;2023-11-14 22:13:20 UTC;all;%user;10.00\n\
             db1;2;2023-11-14 22:13:20 UTC;all;%idle;90.00\n"
        );
        assert_eq!(render(|out| fmt.averages(out, &[table()])), "");
    }

    #[test]
    fn test_restart_and_comment_lines() {
        let fmt = Formatter::new(OutputFormat::Text, &header());
        let text = render(|out| fmt.restart(out, &time()));
        assert!(text.starts_with("12:00:05"));
        assert!(text.contains("LINUX RESTART"));

        let text = render(|out| fmt.comment(out, &time(), "kernel upgrade"));
        assert!(text.contains("COM kernel upgrade"));

        let delimited = Formatter::new(OutputFormat::Delimited, &header());
        let text = render(|out| delimited.restart(out, &time()));
        assert_eq!(text, "db1;-1;2023-11-14 22:13:20 UTC;LINUX-RESTART\n");
    }
}
