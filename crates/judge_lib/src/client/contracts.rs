alloy::sol! {
    interface IPredictionRounds {
        function currentPredictionRound() external view returns (uint256);

        function predictionRounds(uint256 roundId) external view returns (
            uint256 forBlockNumber,
            uint256 startTime,
            uint256 submissionDeadline,
            uint256 predictionCount,
            bool finalized,
            string winnerAgent,
            int256 actualPrice
        );

        function getCurrentMempoolCount() external view returns (uint256);

        function startNewRound() external;

        function finalizeRoundAndMineBlock(bytes32 priceFeedId) external;
    }

    interface IPyth {
        function updatePriceFeeds(bytes[] calldata updateData) external payable;

        function getUpdateFee(bytes[] calldata updateData)
            external
            view
            returns (uint256 feeAmount);
    }
}
