//! Operator execution core.
//!
//! Plan fragments are trees of pull-based [`operators::Operator`]s exchanging
//! [`weft_sheaf::batch::TupleBatch`]es. A fragment is driven to completion by
//! a [`operators::root::RootOperator`] at its top; fragments on different
//! workers are stitched together by the [`exchange`] subsystem.

pub mod aggregate;
pub mod env;
pub mod exchange;
pub mod fragment;
pub mod operators;
pub mod storage;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use weft_sheaf::batch::TupleBatch;
    use weft_sheaf::buffer::TupleBatchBuffer;
    use weft_sheaf::datatype::DataType;
    use weft_sheaf::field::{Field, Schema};

    use crate::env::ExecEnv;
    use crate::exchange::pool::LoopbackExchange;
    use crate::exchange::topology::ExchangeTopology;
    use crate::exchange::producer::Producer;
    use crate::exchange::{ExchangePairId, WorkerId};
    use crate::fragment::{Fragment, FragmentExecutor, FragmentId, FragmentOutcome};
    use crate::operators::consumer::Consumer;
    use crate::operators::rename::Rename;
    use crate::operators::root::{BatchCollector, RootOperator};
    use crate::operators::tuple_source::TupleSource;
    use crate::operators::union_all::UnionAll;
    use crate::operators::BoxedOperator;

    fn people_schema() -> Schema {
        Schema::new([
            Field::new("name", DataType::Utf8),
            Field::new("age", DataType::Int32),
        ])
    }

    fn hundred_rows() -> TupleBatch {
        let mut buffer = TupleBatchBuffer::new(people_schema());
        for i in 0..100 {
            buffer.put_utf8(0, format!("person{i}")).unwrap();
            buffer.put_int32(1, i).unwrap();
        }
        buffer.pop_any().unwrap().unwrap()
    }

    /// Two 100-row sources feeding one rename: 200 rows out under the new
    /// schema, values identical to the inputs concatenated in source order.
    #[test]
    fn rename_two_sources_end_to_end() {
        let env = ExecEnv::default();
        let original = hundred_rows();

        let sources: Vec<BoxedOperator> = vec![
            Box::new(TupleSource::try_new(vec![original.clone()]).unwrap()),
            Box::new(TupleSource::try_new(vec![original.clone()]).unwrap()),
        ];
        let union = Box::new(UnionAll::try_new(sources).unwrap());
        let rename = Box::new(
            Rename::try_new(union, vec!["fullName".to_string(), "ageYears".to_string()]).unwrap(),
        );
        let collector = BatchCollector::new();
        let collected = collector.handle();
        let root = Box::new(RootOperator::new(rename, collector));

        let outcome = Fragment::new(FragmentId::new(1), root).run(&env).unwrap();
        assert_eq!(FragmentOutcome::Completed, outcome);

        let batches = collected.batches();
        assert_eq!(200, collected.num_rows());
        for batch in &batches {
            assert_eq!(
                vec!["fullName", "ageYears"],
                batch.schema().names().collect::<Vec<_>>()
            );
        }
        // Concatenation preserves source order: both halves equal the input.
        for batch in batches {
            for row in 0..batch.num_rows() {
                assert_eq!(
                    original.value(0, row).unwrap(),
                    batch.value(0, row).unwrap()
                );
                assert_eq!(
                    original.value(1, row).unwrap(),
                    batch.value(1, row).unwrap()
                );
            }
        }
    }

    /// One producer worker shuffling to two consumer workers over the
    /// loopback exchange, all three fragments driven concurrently.
    #[test]
    fn shuffle_across_three_workers() {
        let exchange = LoopbackExchange::new();
        let executor = FragmentExecutor::try_new().unwrap();

        let producer_worker = WorkerId::new(1);
        let consumer_workers = [WorkerId::new(2), WorkerId::new(3)];
        let channel_ids = [ExchangePairId::new_unique(), ExchangePairId::new_unique()];

        // Consumer fragments first; they block until data arrives.
        let mut consumer_handles = Vec::new();
        let mut collected = Vec::new();
        for (worker, id) in consumer_workers.iter().zip(channel_ids) {
            let env = ExecEnv::builder()
                .worker_id(*worker)
                .exchange_inbox(exchange.inbox(*worker))
                .build();
            let consumer = Box::new(
                Consumer::try_new(people_schema(), id, vec![producer_worker]).unwrap(),
            );
            let collector = BatchCollector::new();
            collected.push(collector.handle());
            let root = Box::new(RootOperator::new(consumer, collector));
            let fragment = Fragment::new(FragmentId::new(id.raw()), root);
            consumer_handles.push(executor.spawn(fragment, env));
        }

        let env = ExecEnv::builder()
            .worker_id(producer_worker)
            .connection_pool(Arc::new(exchange.pool_for(producer_worker)))
            .build();
        let topology = ExchangeTopology::one_to_one(
            channel_ids.to_vec(),
            consumer_workers.to_vec(),
        )
        .unwrap();
        let producer = Producer::shuffle(topology, vec![1]).unwrap();
        let source = Box::new(TupleSource::try_new(vec![hundred_rows()]).unwrap());
        let root = Box::new(RootOperator::new(source, producer));
        // The producer never blocks on the loopback transport, so it can run
        // on this thread while the consumers wait on the pool.
        let outcome = Fragment::new(FragmentId::new(100), root).run(&env).unwrap();

        assert_eq!(FragmentOutcome::Completed, outcome);
        for handle in consumer_handles {
            assert_eq!(FragmentOutcome::Completed, handle.join().unwrap());
        }

        // Every row lands on exactly one consumer.
        let total: usize = collected.iter().map(|c| c.num_rows()).sum();
        assert_eq!(100, total);

        let mut ages: Vec<i32> = collected
            .iter()
            .flat_map(|c| c.batches())
            .flat_map(|b| b.column(1).unwrap().try_int32().unwrap().to_vec())
            .collect();
        ages.sort_unstable();
        assert_eq!((0..100).collect::<Vec<_>>(), ages);
    }

    /// A collect producer feeding a consumer on the same worker through the
    /// self-reference sentinel.
    #[test]
    fn self_loop_collect_round_trip() {
        let exchange = LoopbackExchange::new();
        let own = WorkerId::new(5);
        let channel = ExchangePairId::new_unique();

        let env = ExecEnv::builder()
            .worker_id(own)
            .connection_pool(Arc::new(exchange.pool_for(own)))
            .exchange_inbox(exchange.inbox(own))
            .build();

        let producer = Producer::collect(channel, WorkerId::SELF).unwrap();
        let source = Box::new(TupleSource::try_new(vec![hundred_rows()]).unwrap());
        let producer_root = Box::new(RootOperator::new(source, producer));
        Fragment::new(FragmentId::new(1), producer_root)
            .run(&env)
            .unwrap();

        let consumer = Box::new(Consumer::try_new(people_schema(), channel, vec![own]).unwrap());
        let collector = BatchCollector::new();
        let collected = collector.handle();
        let consumer_root = Box::new(RootOperator::new(consumer, collector));
        Fragment::new(FragmentId::new(2), consumer_root)
            .run(&env)
            .unwrap();

        assert_eq!(100, collected.num_rows());
    }
}
