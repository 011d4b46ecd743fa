//! Sortlist handling: an operator-supplied CIDR preference list used
//! to reorder A/AAAA answers.  Addresses matching an earlier entry
//! come first; the sort is stable, so relative order is otherwise
//! preserved (and sorting twice changes nothing).

use ipnet::IpNet;
use std::net::IpAddr;

use dns_wire::rdata::{Rdata, Record};

/// The preference rank of an address: the index of the first sortlist
/// entry containing it, or one past the end if none does.
pub fn rank(sortlist: &[IpNet], address: IpAddr) -> usize {
    sortlist
        .iter()
        .position(|net| net.contains(&address))
        .unwrap_or(sortlist.len())
}

/// Stable-sort addresses by sortlist rank.
pub fn sort_addresses(sortlist: &[IpNet], addresses: &mut [IpAddr]) {
    if sortlist.is_empty() {
        return;
    }
    addresses.sort_by_key(|address| rank(sortlist, *address));
}

/// Stable-sort the A/AAAA records of an answer section by sortlist
/// rank, leaving every other record in place: only the slots holding
/// address records are permuted.
pub fn sort_answers(sortlist: &[IpNet], answers: &mut [Record]) {
    if sortlist.is_empty() {
        return;
    }

    let slots: Vec<usize> = answers
        .iter()
        .enumerate()
        .filter_map(|(i, rr)| record_address(rr).map(|_| i))
        .collect();
    if slots.len() < 2 {
        return;
    }

    let mut address_records: Vec<Record> = slots.iter().map(|&i| answers[i].clone()).collect();
    address_records.sort_by_key(|rr| {
        // the filter above means this is always an address record
        rank(sortlist, record_address(rr).unwrap())
    });

    for (slot, rr) in slots.into_iter().zip(address_records) {
        answers[slot] = rr;
    }
}

fn record_address(record: &Record) -> Option<IpAddr> {
    match &record.rdata {
        Rdata::A { address } => Some(IpAddr::V4(*address)),
        Rdata::Aaaa { address } => Some(IpAddr::V6(*address)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dns_wire::message::test_util::*;

    fn sortlist(entries: &[&str]) -> Vec<IpNet> {
        entries.iter().map(|s| s.parse().unwrap()).collect()
    }

    fn addresses(entries: &[&str]) -> Vec<IpAddr> {
        entries.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn preferred_prefixes_come_first() {
        let sortlist = sortlist(&["12.13.0.0/16", "1234::/16"]);
        let mut addrs = addresses(&["2.3.4.5", "12.13.14.15", "1234::5678"]);

        sort_addresses(&sortlist, &mut addrs);

        assert_eq!(addresses(&["12.13.14.15", "1234::5678", "2.3.4.5"]), addrs);
    }

    #[test]
    fn unmatched_addresses_keep_relative_order() {
        let sortlist = sortlist(&["10.0.0.0/8"]);
        let mut addrs = addresses(&["2.3.4.5", "8.8.8.8", "10.1.2.3", "9.9.9.9"]);

        sort_addresses(&sortlist, &mut addrs);

        assert_eq!(
            addresses(&["10.1.2.3", "2.3.4.5", "8.8.8.8", "9.9.9.9"]),
            addrs
        );
    }

    #[test]
    fn sorting_is_idempotent() {
        let sortlist = sortlist(&["2.3.0.0/16", "130.140.150.160/26"]);
        let mut once = addresses(&["130.140.150.161", "8.8.8.8", "2.3.4.5", "2.3.99.99"]);

        sort_addresses(&sortlist, &mut once);
        let mut twice = once.clone();
        sort_addresses(&sortlist, &mut twice);

        assert_eq!(once, twice);
    }

    #[test]
    fn empty_sortlist_changes_nothing() {
        let original = addresses(&["9.9.9.9", "1.1.1.1"]);
        let mut addrs = original.clone();
        sort_addresses(&[], &mut addrs);
        assert_eq!(original, addrs);
    }

    #[test]
    fn answer_sort_leaves_non_address_records_in_place() {
        let sortlist = sortlist(&["10.0.0.0/8"]);
        let mut answers = vec![
            cname_record("www.example.com", "host.example.com"),
            a_record("host.example.com", "2.3.4.5".parse().unwrap()),
            a_record("host.example.com", "10.1.2.3".parse().unwrap()),
        ];

        sort_answers(&sortlist, &mut answers);

        assert_eq!(
            cname_record("www.example.com", "host.example.com"),
            answers[0]
        );
        assert_eq!(
            a_record("host.example.com", "10.1.2.3".parse().unwrap()),
            answers[1]
        );
        assert_eq!(
            a_record("host.example.com", "2.3.4.5".parse().unwrap()),
            answers[2]
        );
    }
}
