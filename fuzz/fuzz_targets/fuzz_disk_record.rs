#![no_main]
use centralcache::disk::decode_record;
use centralcache::Entry;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 65536 { return; }
    // Arbitrary bytes must decode or fail with an error; never panic.
    let _ = decode_record::<String, String>(data);
    let _ = decode_record::<u64, Vec<u8>>(data).map(|e: Entry<u64, Vec<u8>>| e.stats.seq);
});
