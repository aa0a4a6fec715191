//! Context pruning: fit the outbound conversation into a token budget.
//!
//! Greedy and order-preserving: the first message always survives, then the
//! newest messages are kept walking backward until one no longer fits.

use turngraph_core::message::Message;

use crate::context::RunOptions;
use crate::token::estimate_message_tokens;

/// Prune `messages` to `max_tokens` using `cost(index, message)`.
///
/// Returns the input unchanged when it already fits. The first message is
/// kept even when it alone exceeds the budget.
pub fn prune_messages(
    messages: &[Message],
    max_tokens: usize,
    cost: impl Fn(usize, &Message) -> usize,
) -> Vec<Message> {
    let costs: Vec<usize> = messages
        .iter()
        .enumerate()
        .map(|(i, m)| cost(i, m))
        .collect();

    if costs.iter().sum::<usize>() <= max_tokens {
        return messages.to_vec();
    }

    let Some((first, rest)) = messages.split_first() else {
        return Vec::new();
    };

    let mut remaining = max_tokens.saturating_sub(costs[0]);
    let mut kept_from = messages.len();
    for i in (1..messages.len()).rev() {
        if costs[i] > remaining {
            break;
        }
        remaining -= costs[i];
        kept_from = i;
    }

    let mut pruned = Vec::with_capacity(1 + messages.len() - kept_from);
    pruned.push(first.clone());
    pruned.extend_from_slice(&rest[kept_from - 1..]);
    pruned
}

/// Apply the run's pruning options, if any.
///
/// Costs come from the precomputed index map when it has an entry, then
/// from the injected counter, then from the built-in heuristic.
pub fn prune_for_run(messages: &[Message], options: &RunOptions) -> Vec<Message> {
    let Some(max_tokens) = options.max_context_tokens else {
        return messages.to_vec();
    };

    prune_messages(messages, max_tokens, |index, message| {
        if let Some(count) = options.index_token_count_map.get(&index) {
            return *count;
        }
        match &options.token_counter {
            Some(counter) => counter(message),
            None => estimate_message_tokens(message),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn conversation(n: usize) -> Vec<Message> {
        let mut msgs = vec![Message::system("sys")];
        msgs.extend((1..n).map(|i| Message::user(format!("m{i}"))));
        msgs
    }

    fn contents(msgs: &[Message]) -> Vec<&str> {
        msgs.iter().map(|m| m.content.as_str()).collect()
    }

    /// Every message costs 10.
    fn flat(_: usize, _: &Message) -> usize {
        10
    }

    #[test]
    fn within_budget_is_unchanged() {
        let msgs = conversation(4);
        let pruned = prune_messages(&msgs, 40, flat);
        assert_eq!(contents(&pruned), contents(&msgs));
    }

    #[test]
    fn keeps_first_and_newest() {
        let msgs = conversation(6);
        let pruned = prune_messages(&msgs, 35, flat);
        assert_eq!(contents(&pruned), ["sys", "m4", "m5"]);
    }

    #[test]
    fn stops_at_first_message_that_does_not_fit() {
        let msgs = conversation(5);
        // m4 fits, m3 is too big, m2 would fit again but is never reached
        let costs = [10, 1, 1, 50, 5];
        let pruned = prune_messages(&msgs, 20, |i, _| costs[i]);
        assert_eq!(contents(&pruned), ["sys", "m4"]);
    }

    #[test]
    fn oversized_first_message_survives_alone() {
        let msgs = conversation(3);
        let pruned = prune_messages(&msgs, 5, flat);
        assert_eq!(contents(&pruned), ["sys"]);
    }

    #[test]
    fn pruning_is_idempotent() {
        let msgs = conversation(8);
        let once = prune_messages(&msgs, 45, flat);
        let twice = prune_messages(&once, 45, flat);
        assert_eq!(contents(&once), contents(&twice));

        let tiny = prune_messages(&msgs, 5, flat);
        assert_eq!(contents(&prune_messages(&tiny, 5, flat)), contents(&tiny));
    }

    #[test]
    fn empty_input() {
        assert!(prune_messages(&[], 0, flat).is_empty());
    }

    #[test]
    fn run_options_prefer_index_map() {
        let msgs = conversation(4);
        let options = RunOptions::new()
            .with_max_context_tokens(25)
            .with_token_counter(Arc::new(|_: &Message| 10))
            .with_index_token_counts(HashMap::from([(3, 20)]));

        // 0 and 3 cost 30 together, so only the first message survives
        let pruned = prune_for_run(&msgs, &options);
        assert_eq!(contents(&pruned), ["sys"]);
    }

    #[test]
    fn run_options_without_budget_skip_pruning() {
        let msgs = conversation(50);
        assert_eq!(prune_for_run(&msgs, &RunOptions::new()).len(), 50);
    }
}
