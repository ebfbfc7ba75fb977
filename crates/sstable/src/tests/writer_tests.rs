use crate::format::{self, read_footer, RUN_MAGIC};
use crate::*;
use anyhow::Result;
use memtable::Memtable;
use std::io::Read;
use std::io::Seek;
use tempfile::tempdir;

fn make_sample_memtable() -> Memtable {
    let m = Memtable::new();
    m.put(b"a".to_vec(), b"apple".to_vec(), 1);
    m.put(b"b".to_vec(), b"banana".to_vec(), 2);
    m.put(b"c".to_vec(), b"cherry".to_vec(), 3);
    m.delete(b"d".to_vec(), 4); // tombstone
    m
}

#[test]
fn write_empty_memtable_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.db");
    let mem = Memtable::new(); // empty
    let result =
        SSTableWriter::write_from_memtable(&path, &mem, 100, crate::writer::DEFAULT_BITS_PER_KEY);
    assert!(result.is_err(), "writing an empty memtable should fail");
    assert!(
        result.unwrap_err().to_string().contains("empty"),
        "error message should mention 'empty'"
    );
    assert!(
        !path.exists(),
        "no run file should be created for an empty memtable"
    );
}

#[test]
fn write_and_inspect_footer() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("test.db");

    let mem = make_sample_memtable();
    SSTableWriter::write_from_memtable(&path, &mem, 42, crate::writer::DEFAULT_BITS_PER_KEY)?;

    let meta = std::fs::metadata(&path)?;
    assert!(meta.len() > 0);

    let mut f = std::fs::File::open(&path)?;
    let filesize = f.metadata()?.len();
    assert!(
        filesize >= format::FOOTER_BYTES,
        "file too small to contain footer"
    );

    let footer = read_footer(&mut f)?;
    assert_eq!(footer.record_count, 4);
    assert_eq!(footer.max_timestamp, 4);
    assert_eq!(footer.creation_ts, 42);
    assert!(footer.trailer_offset > 0);
    assert!(footer.trailer_offset <= footer.byte_size);
    assert!(footer.byte_size < filesize);

    f.seek(std::io::SeekFrom::End(-4))?;
    let mut buf = [0u8; 4];
    f.read_exact(&mut buf)?;
    assert_eq!(u32::from_le_bytes(buf), RUN_MAGIC);

    Ok(())
}

#[test]
fn tombstone_is_represented_as_zero_length_value() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("tombstone.db");

    let mem = make_sample_memtable();
    SSTableWriter::write_from_memtable(&path, &mem, 1, crate::writer::DEFAULT_BITS_PER_KEY)?;

    let reader = SSTableReader::open(&path)?;
    let d = reader
        .get(b"d")?
        .expect("d must exist as a tombstone record");
    assert_eq!(d.value, None);
    assert_eq!(d.timestamp, 4);

    Ok(())
}

#[test]
fn write_from_iterator_streams_sorted_input() -> Result<()> {
    use memtable::ValueEntry;

    let dir = tempdir()?;
    let path = dir.path().join("streamed.db");

    let entries = vec![
        (
            b"k1".to_vec(),
            ValueEntry {
                timestamp: 1,
                value: Some(b"v1".to_vec()),
            },
        ),
        (
            b"k2".to_vec(),
            ValueEntry {
                timestamp: 2,
                value: Some(b"v2".to_vec()),
            },
        ),
        (
            b"k3".to_vec(),
            ValueEntry {
                timestamp: 3,
                value: None,
            },
        ),
    ];
    SSTableWriter::write_from_iterator(
        &path,
        entries.len(),
        entries.into_iter(),
        7,
        crate::writer::DEFAULT_BITS_PER_KEY,
    )?;

    let reader = SSTableReader::open(&path)?;
    assert_eq!(reader.len(), 3);
    assert_eq!(reader.creation_ts(), 7);
    assert_eq!(reader.get(b"k1")?.unwrap().value, Some(b"v1".to_vec()));
    assert_eq!(reader.get(b"k3")?.unwrap().value, None);

    Ok(())
}

#[test]
fn sparse_index_covers_many_records() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("many.db");

    let mem = Memtable::new();
    for i in 0..500u64 {
        mem.put(format!("key{:05}", i).into_bytes(), b"v".to_vec(), i + 1);
    }
    SSTableWriter::write_from_memtable(&path, &mem, 1, crate::writer::DEFAULT_BITS_PER_KEY)?;

    let reader = SSTableReader::open(&path)?;
    assert_eq!(reader.len(), 500);
    for i in 0..500u64 {
        let key = format!("key{:05}", i).into_bytes();
        let entry = reader
            .get(&key)?
            .expect("key must be found via sparse index scan");
        assert_eq!(entry.timestamp, i + 1);
    }

    Ok(())
}

#[test]
fn higher_bits_per_key_yields_lower_false_positive_rate() -> Result<()> {
    let dir = tempdir()?;

    let mem = Memtable::new();
    for i in 0..200u64 {
        mem.put(format!("present{i:04}").into_bytes(), b"v".to_vec(), i + 1);
    }

    let lean_path = dir.path().join("lean.db");
    SSTableWriter::write_from_memtable(&lean_path, &mem, 1, 2)?;
    let rich_path = dir.path().join("rich.db");
    SSTableWriter::write_from_memtable(&rich_path, &mem, 1, 20)?;

    let lean_reader = SSTableReader::open(&lean_path)?;
    let rich_reader = SSTableReader::open(&rich_path)?;

    let absent_keys: Vec<Vec<u8>> = (0..2000u64)
        .map(|i| format!("absent{i:06}").into_bytes())
        .collect();

    let lean_false_positives = absent_keys
        .iter()
        .filter(|k| lean_reader.might_contain(k))
        .count();
    let rich_false_positives = absent_keys
        .iter()
        .filter(|k| rich_reader.might_contain(k))
        .count();

    assert!(
        rich_false_positives <= lean_false_positives,
        "a richer bloom filter budget should not increase false positives \
         (lean={lean_false_positives}, rich={rich_false_positives})"
    );

    Ok(())
}
