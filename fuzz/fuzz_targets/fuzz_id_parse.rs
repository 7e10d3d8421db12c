#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use plexus_core::ComponentId;
use plexus_core::prop::split_id_and_prop;

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    key: &'a str,
}

fuzz_target!(|input: Input<'_>| {
    // Any id that parses must survive a stringify round trip unchanged.
    let Ok((id, _prop)) = split_id_and_prop(input.key) else {
        return;
    };
    let Ok(parsed) = ComponentId::parse(id) else {
        return;
    };
    let again = ComponentId::parse(&parsed.stringify()).expect("canonical form parses");
    assert_eq!(again, parsed);
});
