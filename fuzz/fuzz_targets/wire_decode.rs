#![no_main]

use libfuzzer_sys::fuzz_target;
use the_msgpack::{
  decode,
  decode_prefix,
  encode,
  frame_len,
};

fuzz_target!(|data: &[u8]| {
  let framed = frame_len(data);

  match decode_prefix(data) {
    Ok((value, consumed)) => {
      assert_eq!(framed, Ok(Some(consumed)));
      // Re-encoding may pick a smaller form, but must decode to the same value.
      let Ok(bytes) = encode(&value) else {
        panic!("decoded value failed to encode: {value}");
      };
      let Ok(again) = decode(&bytes) else {
        panic!("re-encoded value failed to decode: {value}");
      };
      // NaN floats are the only values not equal to themselves.
      if !format!("{value}").contains("NaN") {
        assert_eq!(again, value);
      }
    },
    Err(err) if err.is_incomplete() => {
      if let Ok(Some(len)) = framed {
        panic!("frame_len found {len} bytes but decode ran out of input");
      }
    },
    Err(_) => {},
  }
});
