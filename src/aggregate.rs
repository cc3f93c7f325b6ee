use std::collections::HashMap;

use crate::ticket::{is_ticket_number, Candidate};

/// Keep the best candidate per distinct number.
///
/// The highest confidence wins; on a tie the first one seen stays. Output
/// order is the order in which each number was first seen. Candidates whose
/// number is not six digits are dropped.
pub fn aggregate<I>(candidates: I) -> Vec<Candidate>
where
    I: IntoIterator<Item = Candidate>,
{
    let mut best: Vec<Candidate> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for c in candidates {
        if !is_ticket_number(&c.number) {
            continue;
        }
        match index.get(&c.number) {
            Some(&i) => {
                if c.confidence > best[i].confidence {
                    best[i] = c;
                }
            }
            None => {
                index.insert(c.number.clone(), best.len());
                best.push(c);
            }
        }
    }
    best
}
