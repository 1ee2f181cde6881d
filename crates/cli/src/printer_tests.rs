use std::{
    io::{self, Write},
    time::Duration,
};

use ferry_stage::{StageError, Target};
use serde_json::Value;

use super::*;

fn events(producer: usize, seqs: std::ops::Range<u64>) -> Vec<Event> {
    seqs.map(|seq| Event { producer, seq }).collect()
}

#[test]
fn writes_one_numbered_line_per_batch() {
    let printer = BatchPrinter::new(Vec::new(), Duration::ZERO);

    printer.post_batch(events(0, 0..3)).unwrap();
    printer.post_batch(events(1, 0..2)).unwrap();

    let out = String::from_utf8(printer.into_inner()).unwrap();
    let lines: Vec<Value> = out
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["batch"], 1);
    assert_eq!(lines[0]["size"], 3);
    assert_eq!(lines[1]["batch"], 2);
    assert_eq!(lines[1]["size"], 2);

    let second: Vec<Event> = serde_json::from_value(lines[1]["events"].clone()).unwrap();
    assert_eq!(second, events(1, 0..2));
}

#[test]
fn single_post_is_a_batch_of_one() {
    let printer = BatchPrinter::new(Vec::new(), Duration::ZERO);
    printer.post(Event { producer: 4, seq: 9 }).unwrap();

    let out = String::from_utf8(printer.into_inner()).unwrap();
    let line: Value = serde_json::from_str(out.trim_end()).unwrap();
    assert_eq!(line["size"], 1);
    assert_eq!(line["events"][0]["producer"], 4);
    assert_eq!(line["events"][0]["seq"], 9);
}

struct BrokenPipe;

impl Write for BrokenPipe {
    fn write(&mut self, _: &[u8]) -> io::Result<usize> {
        Err(io::Error::from(io::ErrorKind::BrokenPipe))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn write_failure_is_a_delivery_error() {
    let printer = BatchPrinter::new(BrokenPipe, Duration::ZERO);
    let err = printer.post_batch(events(0, 0..1)).unwrap_err();
    assert!(matches!(err, StageError::Delivery(_)));
}
