/*!

This is the long-form manual for `poll_tally` and `verdict`.

## Polls and ballots

A poll has a prompt and at least two choices. Choices must be non-empty and distinct
(comparison is case-sensitive). A choice is referred to by its position in the list,
starting at 0.

A ballot ranks *every* choice of its poll exactly once. The ballot `[2, 0, 1]` on the poll
`["apple", "banana", "clementine"]` means: clementine first, then apple, then banana.
Partial rankings are rejected, and so are repeated or out-of-range indices.

Each voter may submit one ballot per poll. When no voter id is given, a random one is
assigned, so anonymous ballots never collide.

## Counting

The count is an instant runoff:

1. Each ballot counts for its most preferred choice that is still in the running.
2. A choice with more than half of the ballots wins. The threshold is
   `floor(total / 2) + 1`.
3. Otherwise the choice with the fewest votes is eliminated and a new round starts.

Since every ballot ranks every choice, no ballot is ever exhausted and the total never
changes from one round to the next. With `n` choices, at most `n - 1` choices are
eliminated before a winner is found.

### Ties for last place

When several choices share the lowest count, a sub-election is held among them only.
Every ballot takes part, including ballots currently counting for a choice that is not
tied: each ballot counts for the tied choice it ranks highest.

- If a single choice comes last in the sub-election, it is eliminated.
- If all the tied choices receive the same count, the ballots cannot separate them and the
  tie-break source picks the eliminated choice.
- Otherwise a new sub-election is held among the choices that came last, and so on.

Each round of the result records how its tie was settled, and at which depth of
sub-election.

## Tie-break modes

| mode             | behaviour                                                        |
|------------------|------------------------------------------------------------------|
| `random`         | ChaCha stream seeded with `randomSeed`. Reproducible.            |
| `entropy`        | ChaCha stream seeded by the operating system. The default.       |
| `hashed`         | Smallest SHA-256 digest of the seed, round and choice. Stateless. |
| `useChoiceOrder` | The tied choice listed last in the poll is eliminated.           |

With a seeded mode, tallying the same ballots twice always gives the same result.

## The `verdict` program

```text
verdict [--config FILE] [--data FILE] [--seed SEED] [-v] <COMMAND>

    create-poll --prompt P --choice A --choice B ...
    cast        --poll ID [--voter V] --ranks 2,0,1
    show        --poll ID
    result      --poll ID [--out PATH]
    tally       --input ELECTION.json [--reference SUMMARY.json] [--out PATH]
```

Polls and ballots are kept in a single JSON file (`verdict.json` by default). Writes go
through a temporary file that is then renamed over the data file. Every access locks a
sibling `verdict.json.lock` file, so several `verdict` processes can share one data file.

The exit code is 2 when the input was invalid and 1 for any other failure.

## Configuration

The configuration file is a JSON object. All the fields are optional:

```text
{
    "dataFile": "polls.json",
    "tiebreakMode": "random",
    "randomSeed": "42"
}
```

`randomSeed` is required by the `random` and `hashed` modes. The `--data` and `--seed`
flags take precedence over the file.

## Election files

The `tally` command counts an election held outside of the data file:

```text
{
    "prompt": "What is the best fruit?",
    "choices": ["apple", "banana", "clementine"],
    "ballots": [
        {"ranking": ["banana", "apple", "clementine"], "count": 2},
        {"ranking": ["clementine", "apple", "banana"]}
    ]
}
```

Rankings use the labels of the choices. `count` defaults to 1. When a reference summary is
given, the result is compared with it and any difference is printed.

 */
